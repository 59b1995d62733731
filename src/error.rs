use thiserror::Error;

/// Outbound operation that failed or was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Embed,
    Query,
    Upsert,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Embed => "embed",
            Operation::Query => "query",
            Operation::Upsert => "upsert",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{operation} failed in namespace {namespace:?}")]
    Upstream {
        operation: Operation,
        namespace: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: Operation },
}

impl RetrievalError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        RetrievalError::InvalidArgument(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, RetrievalError::InvalidArgument(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetrievalError::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
