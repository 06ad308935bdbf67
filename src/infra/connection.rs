//! Start-up connection to the database with bounded exponential backoff.
//!
//! The manager opens the one pool handle the process shares for its lifetime. It retries
//! only here, at start-up; per-query failures are never retried.

use crate::error::{BoxError, ConfigError, ConnectionError};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

/// Which driver log categories are enabled (`query,info,warn,error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogVerbosity {
    pub query: bool,
    pub info: bool,
    pub warn: bool,
    pub error: bool,
}

impl LogVerbosity {
    /// Default tracing filter directive matching the enabled categories. `query` only
    /// raises this crate and sqlx to debug.
    pub fn filter_directive(&self) -> &'static str {
        if self.query {
            "softgate=debug,sqlx=debug,info"
        } else if self.info {
            "info"
        } else if self.warn {
            "warn"
        } else {
            "error"
        }
    }
}

impl Default for LogVerbosity {
    fn default() -> Self {
        Self { query: false, info: false, warn: true, error: true }
    }
}

impl FromStr for LogVerbosity {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut verbosity = Self { query: false, info: false, warn: false, error: false };
        for level in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match level.to_lowercase().as_str() {
                "query" => verbosity.query = true,
                "info" => verbosity.info = true,
                "warn" => verbosity.warn = true,
                "error" => verbosity.error = true,
                other => {
                    return Err(ConfigError::Invalid {
                        var: "DATABASE_LOG_LEVEL",
                        reason: format!("unknown log level '{}'", other),
                    })
                }
            }
        }
        Ok(verbosity)
    }
}

/// Where and as whom to connect. The password never leaves this struct in clear
/// text except towards the driver.
#[derive(Clone)]
pub struct ConnectionConfig {
    host: String,
    port: Option<u16>,
    database: Option<String>,
    username: String,
    password: String,
    log_verbosity: LogVerbosity,
}

impl ConnectionConfig {
    /// `host` is `host[:port][/database]`. IPv6 literals go in brackets when a port
    /// follows (`[::1]:5432`); a bare literal (`::1`) is taken as a host without port.
    pub fn new(
        host: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        log_verbosity: LogVerbosity,
    ) -> Result<Self, ConfigError> {
        let (authority, database) = match host.split_once('/') {
            Some((authority, db)) if !db.is_empty() => (authority, Some(db.to_string())),
            Some((authority, _)) => (authority, None),
            None => (host, None),
        };
        let (hostname, port) = split_host_port(authority)?;
        if hostname.is_empty() {
            return Err(ConfigError::Invalid {
                var: "DATABASE_HOST",
                reason: "host name is empty".to_string(),
            });
        }

        Ok(Self {
            host: hostname.to_string(),
            port,
            database,
            username: username.into(),
            password: password.into(),
            log_verbosity,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn log_verbosity(&self) -> LogVerbosity {
        self.log_verbosity
    }

    /// Connection target for diagnostics, with the password masked.
    pub fn redacted_url(&self) -> String {
        let mut url = if self.host.contains(':') {
            format!("postgres://{}:***@[{}]", self.username, self.host)
        } else {
            format!("postgres://{}:***@{}", self.username, self.host)
        };
        if let Some(port) = self.port {
            url.push_str(&format!(":{}", port));
        }
        if let Some(db) = &self.database {
            url.push('/');
            url.push_str(db);
        }
        url
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(&self.password);
        if let Some(port) = self.port {
            options = options.port(port);
        }
        if let Some(db) = &self.database {
            options = options.database(db);
        }
        if !self.log_verbosity.query {
            options = options.disable_statement_logging();
        }
        options
    }
}

fn split_host_port(authority: &str) -> Result<(&str, Option<u16>), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { var: "DATABASE_HOST", reason };

    let (hostname, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (name, after) = bracketed
            .split_once(']')
            .ok_or_else(|| invalid("unclosed '[' in host".to_string()))?;
        match after {
            "" => (name, None),
            _ => match after.strip_prefix(':') {
                Some(port) => (name, Some(port)),
                None => return Err(invalid(format!("unexpected '{}' after host", after))),
            },
        }
    } else if authority.matches(':').count() > 1 {
        (authority, None)
    } else {
        match authority.split_once(':') {
            Some((name, port)) => (name, Some(port)),
            None => (authority, None),
        }
    };

    let port = port
        .map(|p| p.parse::<u16>().map_err(|_| invalid(format!("invalid port '{}'", p))))
        .transpose()?;
    Ok((hostname, port))
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("log_verbosity", &self.log_verbosity)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after attempt `n` is `unit * 2^n`.
    pub unit: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    /// Five attempts, waiting 2s, 4s, 8s, 16s in between.
    fn default() -> Self {
        Self { max_attempts: 5, unit: Duration::from_secs(1) }
    }
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    retry: RetryPolicy,
    max_connections: u32,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config, retry: RetryPolicy::default(), max_connections: 5 }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Opens the shared Postgres pool, retrying per the policy.
    pub async fn connect(&self) -> Result<PgPool, ConnectionError> {
        let max_connections = self.max_connections;
        self.connect_with(|config| {
            let options = config.connect_options();
            async move {
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect_with(options)
                    .await
            }
        })
        .await
    }

    /// Retry loop over an arbitrary opener. The backoff is a tokio timer, so dropping
    /// the returned future cancels the wait.
    pub async fn connect_with<F, Fut, C, E>(&self, mut open: F) -> Result<C, ConnectionError>
    where
        F: FnMut(&ConnectionConfig) -> Fut,
        Fut: Future<Output = Result<C, E>>,
        E: Into<BoxError>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let db = self.config.redacted_url();
        let mut attempt = 1;

        loop {
            match open(&self.config).await {
                Ok(connection) => {
                    tracing::info!(%db, attempt, "database connected");
                    return Ok(connection);
                }
                Err(err) => {
                    let err: BoxError = err.into();
                    if attempt >= max_attempts {
                        tracing::error!(%db, attempts = attempt, error = %err, "giving up on database connection");
                        return Err(ConnectionError { attempts: attempt, source: err });
                    }

                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        %db,
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "database connection attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
