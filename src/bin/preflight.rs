use softgate::infra::config;
use softgate::storage::sql::validate_ident;
use softgate::{ConnectionManager, RetryPolicy};
use sqlx::Row;
use std::time::Duration;

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight -- [--retry]\n\
         \n\
         Requires env vars:\n\
           DATABASE_HOST, DATABASE_USERNAME, DATABASE_PASSWORD\n\
         Optional:\n\
           DATABASE_LOG_LEVEL, SOFT_DELETE_MODELS, TEMPORAL_FIELDS\n\
         \n\
         --retry  use the start-up retry policy (5 attempts) instead of a single attempt\n"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }
    let retry = args.iter().any(|a| a == "--retry");

    // Force-read config (nice error messages if missing)
    let connection = config::connection_config()?;
    let policy = config::field_policy();

    println!("> Preflight:");
    println!("  DATABASE={}", connection.redacted_url());
    println!("  LOG_LEVEL filter={}", connection.log_verbosity().filter_directive());
    let mut models: Vec<&str> = policy.soft_delete_models().collect();
    models.sort_unstable();
    let mut fields: Vec<&str> = policy.temporal_fields().collect();
    fields.sort_unstable();
    println!("  SOFT_DELETE_MODELS={:?}", models);
    println!("  TEMPORAL_FIELDS={:?}", fields);

    let mut manager = ConnectionManager::new(connection).with_max_connections(1);
    if !retry {
        manager = manager.with_retry_policy(RetryPolicy { max_attempts: 1, unit: Duration::from_secs(1) });
    }
    let pool = manager.connect().await?;

    let version: String = sqlx::query_scalar("SELECT version()").fetch_one(&pool).await?;
    println!("  Server: {}", version);

    // Every soft-delete model needs a boolean delFlag column or rewritten queries fail.
    let mut missing = Vec::new();
    for model in &models {
        if !validate_ident(model) {
            missing.push(format!("{} (not a valid identifier)", model));
            continue;
        }
        let row = sqlx::query(
            "SELECT data_type FROM information_schema.columns WHERE table_name = $1 AND column_name = 'delFlag'",
        )
        .bind(*model)
        .fetch_optional(&pool)
        .await?;
        match row {
            Some(r) => {
                let data_type: String = r.try_get("data_type")?;
                if data_type != "boolean" {
                    missing.push(format!("{} (delFlag is {}, expected boolean)", model, data_type));
                } else {
                    println!("  {}: delFlag ok", model);
                }
            }
            None => missing.push(format!("{} (no delFlag column)", model)),
        }
    }
    pool.close().await;

    if !missing.is_empty() {
        return Err(anyhow::anyhow!("Soft-delete models not ready: {}", missing.join(", ")));
    }

    println!("> Preflight OK.");
    Ok(())
}
