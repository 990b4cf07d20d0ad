use crate::model::UserId;
use crate::repo::RepoError;

#[derive(Debug)]
pub enum EngineError {
    Storage(RepoError),
    UnknownUser(UserId),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Storage(e) => write!(f, "storage failure: {e}"),
            EngineError::UnknownUser(id) => write!(f, "unknown user: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(e: RepoError) -> Self {
        EngineError::Storage(e)
    }
}
