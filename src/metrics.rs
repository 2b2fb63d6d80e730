//! Filter statistics
//!
//! Thread-safe counters for how many pushes were inspected and how they were
//! decided, served as JSON on `/-/stats`. Only pushes to a project with a
//! configured policy are counted, under that project's configured key.

use crate::policy::DenyReason;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Tag filter statistics collector
pub struct FilterStats {
    start_time: Instant,
    inspected: AtomicU64,
    allowed: AtomicU64,
    denied_blacklist: AtomicU64,
    denied_whitelist: AtomicU64,
    /// Denials per project
    denials: RwLock<HashMap<String, u64>>,
}

/// Denial count for one project
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ProjectDenials {
    pub project: String,
    pub denied: u64,
}

/// Serializable statistics snapshot
///
/// Counts cover pushes to projects with a policy only.
#[derive(Clone, Debug, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub inspected: u64,
    pub allowed: u64,
    pub denied_blacklist: u64,
    pub denied_whitelist: u64,
    /// Sorted by denial count, highest first
    pub projects: Vec<ProjectDenials>,
}

impl FilterStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            inspected: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            denied_blacklist: AtomicU64::new(0),
            denied_whitelist: AtomicU64::new(0),
            denials: RwLock::new(HashMap::new()),
        }
    }

    /// Record an allowed push
    pub fn record_allowed(&self) {
        self.inspected.fetch_add(1, Ordering::Relaxed);
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected push
    pub fn record_denied(&self, project: &str, reason: DenyReason) {
        self.inspected.fetch_add(1, Ordering::Relaxed);
        match reason {
            DenyReason::Blacklisted => self.denied_blacklist.fetch_add(1, Ordering::Relaxed),
            DenyReason::NotWhitelisted => self.denied_whitelist.fetch_add(1, Ordering::Relaxed),
        };

        let mut denials = self.denials.write().unwrap_or_else(|poisoned| {
            tracing::warn!("stats lock poisoned, recovering");
            poisoned.into_inner()
        });
        if let Some(count) = denials.get_mut(project) {
            *count += 1;
        } else {
            denials.insert(project.to_string(), 1);
        }
    }

    pub fn inspected(&self) -> u64 {
        self.inspected.load(Ordering::Relaxed)
    }

    pub fn denied(&self) -> u64 {
        self.denied_blacklist.load(Ordering::Relaxed)
            + self.denied_whitelist.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all statistics
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut projects: Vec<ProjectDenials> = {
            let denials = self.denials.read().unwrap_or_else(|poisoned| {
                tracing::warn!("stats lock poisoned, recovering");
                poisoned.into_inner()
            });
            denials
                .iter()
                .map(|(project, denied)| ProjectDenials {
                    project: project.clone(),
                    denied: *denied,
                })
                .collect()
        };
        projects.sort_by(|a, b| b.denied.cmp(&a.denied).then(a.project.cmp(&b.project)));

        StatsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            inspected: self.inspected(),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied_blacklist: self.denied_blacklist.load(Ordering::Relaxed),
            denied_whitelist: self.denied_whitelist.load(Ordering::Relaxed),
            projects,
        }
    }
}

impl Default for FilterStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = FilterStats::new();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.inspected, 0);
        assert_eq!(snapshot.allowed, 0);
        assert!(snapshot.projects.is_empty());
    }

    #[test]
    fn test_record_decisions() {
        let stats = FilterStats::new();
        stats.record_allowed();
        stats.record_denied("team/a", DenyReason::Blacklisted);
        stats.record_denied("team/b", DenyReason::NotWhitelisted);
        stats.record_denied("team/b", DenyReason::Blacklisted);

        assert_eq!(stats.inspected(), 4);
        assert_eq!(stats.denied(), 3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.allowed, 1);
        assert_eq!(snapshot.denied_blacklist, 2);
        assert_eq!(snapshot.denied_whitelist, 1);
        assert_eq!(
            snapshot.projects,
            vec![
                ProjectDenials {
                    project: "team/b".into(),
                    denied: 2
                },
                ProjectDenials {
                    project: "team/a".into(),
                    denied: 1
                },
            ]
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = FilterStats::new();
        stats.record_denied("team/a", DenyReason::Blacklisted);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["denied_blacklist"], 1);
        assert_eq!(json["projects"][0]["project"], "team/a");
    }
}
