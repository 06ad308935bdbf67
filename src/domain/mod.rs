//! Request rewriting and result normalization. Pure code, no I/O.

pub mod normalize;
pub mod operation;
pub mod policy;
pub mod result;
pub mod rewrite;

pub use normalize::ResultNormalizer;
pub use operation::{Action, JsonMap, OperationArgs, OperationRequest};
pub use policy::FieldPolicy;
pub use result::{OperationResult, Record, Value};
pub use rewrite::OperationRewriter;
