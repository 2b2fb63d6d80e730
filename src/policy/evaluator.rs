//! Tag policy evaluation
//!
//! A [`PolicySet`] is the compiled form of the `[projects]` configuration.
//! Evaluation for a push to `project` with tag `tag`:
//!
//! 1. Look up the policy whose key equals the project path. No policy → allow.
//! 2. If any blacklist pattern matches the tag → deny, stop.
//! 3. If the whitelist is non-empty and no pattern matches the tag → deny.
//! 4. Otherwise allow.
//!
//! At most one denial is produced per request.

use crate::config::{PolicyConfig, TagPolicyConfig};
use crate::error::ConfigError;
use crate::policy::normalize_project;
use regex::{Regex, RegexSet};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};

/// Why a tag was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The tag matched a blacklist pattern
    Blacklisted,
    /// The whitelist is non-empty and the tag matched none of it
    NotWhitelisted,
}

impl DenyReason {
    /// The response body sent to the client
    pub fn message(self) -> &'static str {
        match self {
            DenyReason::Blacklisted => {
                "The image tag is in blackList. Any push request is prohibited."
            }
            DenyReason::NotWhitelisted => {
                "The image tag is not in whiteList. Any push request is prohibited."
            }
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Blacklisted => write!(f, "blacklisted"),
            DenyReason::NotWhitelisted => write!(f, "not whitelisted"),
        }
    }
}

/// Result of a policy check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The push may proceed
    Allow,
    /// The push must be rejected
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Deny(_))
    }
}

/// Compiled policy for one project
///
/// Blacklist patterns stay individual so a denial can name the pattern that
/// fired; the whitelist only needs an any-match answer.
#[derive(Debug, Clone, Default)]
pub struct TagPolicy {
    black_list: Vec<Regex>,
    white_list: Option<RegexSet>,
}

impl TagPolicy {
    /// Compile a project policy
    pub fn new(config: &TagPolicyConfig) -> Result<Self, ConfigError> {
        Self::compile(config, "tag policy")
    }

    /// Compile a policy, naming `scope` in pattern errors
    fn compile(config: &TagPolicyConfig, scope: &str) -> Result<Self, ConfigError> {
        let black_list = config
            .black_list
            .iter()
            .map(|pattern| compile_pattern(pattern, scope, "black_list"))
            .collect::<Result<Vec<_>, _>>()?;

        // Compile one by one first so an error names the offending pattern
        for pattern in &config.white_list {
            compile_pattern(pattern, scope, "white_list")?;
        }
        let white_list = if config.white_list.is_empty() {
            None
        } else {
            let set = RegexSet::new(&config.white_list).map_err(|e| {
                ConfigError::InvalidPattern {
                    pattern: config.white_list.join(", "),
                    reason: format!("in {}.white_list: {}", scope, e),
                }
            })?;
            Some(set)
        };

        Ok(Self {
            black_list,
            white_list,
        })
    }

    /// Check a tag against the blacklist, then the whitelist
    pub fn evaluate(&self, tag: &str) -> Decision {
        if let Some(regex) = self.black_list.iter().find(|regex| regex.is_match(tag)) {
            trace!(tag, pattern = regex.as_str(), "Tag matched blacklist pattern");
            return Decision::Deny(DenyReason::Blacklisted);
        }

        if let Some(white_list) = &self.white_list
            && !white_list.is_match(tag)
        {
            trace!(tag, "Tag matched no whitelist pattern");
            return Decision::Deny(DenyReason::NotWhitelisted);
        }

        Decision::Allow
    }
}

fn compile_pattern(pattern: &str, scope: &str, list: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: format!("in {}.{}: {}", scope, list, e),
    })
}

/// Compiled policies for every configured project
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    /// Keyed by [`normalize_project`] form
    projects: HashMap<String, TagPolicy>,
}

impl PolicySet {
    /// Compile every project policy
    ///
    /// Fails on the first invalid pattern, on an empty project key, or on two
    /// keys naming the same project.
    pub fn new(config: &PolicyConfig) -> Result<Self, ConfigError> {
        let mut projects = HashMap::with_capacity(config.len());
        for (name, policy) in config {
            let key = normalize_project(name);
            if key.is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("project key '{}' is empty", name),
                });
            }
            let compiled = TagPolicy::compile(policy, &format!("projects.{}", name))?;
            if projects.insert(key, compiled).is_some() {
                return Err(ConfigError::Invalid {
                    message: format!("project '{}' is configured more than once", name),
                });
            }
        }
        Ok(Self { projects })
    }

    /// A policy set without any projects; every push is allowed
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Get the compiled policy for a project path
    pub fn get(&self, project: &str) -> Option<&TagPolicy> {
        self.lookup(project).map(|(_, policy)| policy)
    }

    /// Get the configured project key and its policy for a project path
    ///
    /// The key is the normalized form, so every spelling of a project maps
    /// to the same one.
    pub fn lookup(&self, project: &str) -> Option<(&str, &TagPolicy)> {
        self.projects
            .get_key_value(&normalize_project(project))
            .map(|(key, policy)| (key.as_str(), policy))
    }

    /// Decide whether `tag` may be pushed to `project`
    pub fn evaluate(&self, project: &str, tag: &str) -> Decision {
        match self.lookup(project) {
            Some((key, policy)) => {
                let decision = policy.evaluate(tag);
                debug!(project = key, tag, ?decision, "Evaluated tag policy");
                decision
            }
            None => {
                trace!(project, "No tag policy for project, skipping check");
                Decision::Allow
            }
        }
    }
}
