//! Policy snapshot storage
//!
//! The filter reads policies through [`PolicyProvider`]. [`PolicyStore`] is the
//! provider the gateway uses: readers clone an `Arc` to the current snapshot
//! and never hold the lock while matching, so a reload never races a request.

use crate::config::load_config;
use crate::error::ConfigError;
use crate::policy::evaluator::PolicySet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info};

/// Source of the policy snapshot consulted for each request
pub trait PolicyProvider: Send + Sync {
    /// The active policies, or `None` when no policy is configured
    fn current(&self) -> Option<Arc<PolicySet>>;
}

/// A fixed snapshot that never changes
impl PolicyProvider for Arc<PolicySet> {
    fn current(&self) -> Option<Arc<PolicySet>> {
        if self.is_empty() {
            None
        } else {
            Some(Arc::clone(self))
        }
    }
}

/// Swappable policy snapshot
#[derive(Debug, Default)]
pub struct PolicyStore {
    snapshot: RwLock<Arc<PolicySet>>,
}

impl PolicyStore {
    pub fn new(policies: PolicySet) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(policies)),
        }
    }

    // Poisoning only means a writer panicked mid-swap; the Arc is always whole.

    fn read_snapshot(&self) -> RwLockReadGuard<'_, Arc<PolicySet>> {
        self.snapshot.read().unwrap_or_else(|poisoned| {
            tracing::warn!("policy snapshot lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_snapshot(&self) -> RwLockWriteGuard<'_, Arc<PolicySet>> {
        self.snapshot.write().unwrap_or_else(|poisoned| {
            tracing::warn!("policy snapshot lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Install a new snapshot, returning the previous one
    pub fn replace(&self, policies: PolicySet) -> Arc<PolicySet> {
        let next = Arc::new(policies);
        std::mem::replace(&mut *self.write_snapshot(), next)
    }

    /// The installed snapshot, even when it holds no projects
    pub fn snapshot(&self) -> Arc<PolicySet> {
        Arc::clone(&self.read_snapshot())
    }

    /// Re-read the configuration file and install its policies
    ///
    /// On failure the previously installed policies stay active.
    pub fn reload_from(&self, config_path: Option<&str>) -> Result<usize, ConfigError> {
        let result = load_config(config_path).and_then(|config| PolicySet::new(&config.projects));

        match result {
            Ok(policies) => {
                let count = policies.len();
                self.replace(policies);
                info!(projects = count, "Reloaded tag policies");
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "Failed to reload tag policies, keeping previous policies");
                Err(e)
            }
        }
    }
}

impl PolicyProvider for PolicyStore {
    fn current(&self) -> Option<Arc<PolicySet>> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            None
        } else {
            Some(snapshot)
        }
    }
}
