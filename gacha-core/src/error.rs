use thiserror::Error;

use crate::category::PoolCategory;
use crate::rules::RuleConfigError;

/// Errors surfaced to callers of the session and resolver APIs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("refusing to build a {category} session: {source}")]
    InvalidRules {
        category: PoolCategory,
        #[source]
        source: RuleConfigError,
    },
    #[error("batch size must be at least 1")]
    EmptyBatch,
    #[error("no rules for category '{token}' and no default category available")]
    UnknownCategory { token: String },
}
