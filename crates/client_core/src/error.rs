use std::fmt;

use shared::error::ServerFailure;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Previous,
    Next,
}

impl Direction {
    fn adjective(self) -> &'static str {
        match self {
            Self::Previous => "previous",
            Self::Next => "next",
        }
    }
}

/// Mutating operations covered by the single-flight guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    Mint,
    NewIteration,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mint => f.write_str("Mint"),
            Self::NewIteration => f.write_str("New iteration"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any request was sent.
    Precondition,
    Transport,
    Application,
}

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("No entity loaded.")]
    NoEntityLoaded,
    #[error("No card available for this iteration.")]
    NoCardForIteration { iter: u32 },
    #[error("No {} card available.", .0.adjective())]
    NoSuchIteration(Direction),
    #[error("{0} already in progress; retry later.")]
    OperationPending(Mutation),
    #[error("iteration {iter} is still pending server confirmation")]
    PlaceholderNotAuthoritative { iter: u32 },
    #[error("iteration {iter} must exist before a new iteration can follow it")]
    PredecessorNotCommitted { iter: u32 },
    #[error("iteration {iter} already exists")]
    IterationAlreadyExists { iter: u32 },
    #[error("Please enter an API Key")]
    MissingApiKey,
    #[error("invalid endpoint url '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("No server reachable.")]
    Unreachable { attempts: Vec<String> },
    #[error("{message}")]
    Application { message: String },
    #[error("malformed response: unusable `{field}`")]
    MalformedResponse { field: &'static str },
    #[error("API key was rejected.")]
    Unauthorized,
}

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unreachable { .. } => ErrorCategory::Transport,
            Self::Application { .. } | Self::MalformedResponse { .. } | Self::Unauthorized => {
                ErrorCategory::Application
            }
            _ => ErrorCategory::Precondition,
        }
    }

    /// Authentication failures end the session instead of being shown
    /// as a transient notice.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<ServerFailure> for ClientError {
    fn from(value: ServerFailure) -> Self {
        Self::Application {
            message: value.message,
        }
    }
}
