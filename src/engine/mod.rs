mod cutoff;
mod error;
mod mutations;
mod queries;

pub use cutoff::CutoffPolicy;
pub use error::EngineError;
pub use queries::effective_selection;

use std::sync::Arc;

use crate::repo::Repository;

/// Reservation rules: which days may still change and what a change does.
///
/// Holds no locks of its own. Callers serialize work per user through
/// [`crate::queue::IdentityQueue`] so a read-modify-write on one
/// `(user, date)` pair never interleaves with another.
pub struct Engine {
    repo: Arc<dyn Repository>,
    policy: CutoffPolicy,
}

impl Engine {
    pub fn new(repo: Arc<dyn Repository>, policy: CutoffPolicy) -> Self {
        Self { repo, policy }
    }

    pub fn policy(&self) -> &CutoffPolicy {
        &self.policy
    }
}
