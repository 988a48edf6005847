//! NAS access-group rules and their reconciliation

use crate::error::{Result, RuleError};
use crate::merge::{Matched, MergePolicy, merge_sorted};
use crate::order::PriorityOrder;
use crate::traits::{Comparable, Identifiable, Prioritized};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RwAccessType {
    #[serde(rename = "RW")]
    ReadWrite,
    #[serde(rename = "R")]
    ReadOnly,
}

impl fmt::Display for RwAccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RwAccessType::ReadWrite => write!(f, "RW"),
            RwAccessType::ReadOnly => write!(f, "R"),
        }
    }
}

impl FromStr for RwAccessType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RW" => Ok(RwAccessType::ReadWrite),
            "R" => Ok(RwAccessType::ReadOnly),
            _ => Err(RuleError::UnknownRwAccessType(s.to_string())),
        }
    }
}

/// How client user ids are mapped on the share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAccessType {
    AllSquash,
    RootSquash,
    NoRootSquash,
}

impl UserAccessType {
    pub const ALL: [UserAccessType; 3] = [
        UserAccessType::AllSquash,
        UserAccessType::RootSquash,
        UserAccessType::NoRootSquash,
    ];
}

impl fmt::Display for UserAccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserAccessType::AllSquash => write!(f, "all_squash"),
            UserAccessType::RootSquash => write!(f, "root_squash"),
            UserAccessType::NoRootSquash => write!(f, "no_root_squash"),
        }
    }
}

impl FromStr for UserAccessType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_squash" => Ok(UserAccessType::AllSquash),
            "root_squash" => Ok(UserAccessType::RootSquash),
            "no_root_squash" => Ok(UserAccessType::NoRootSquash),
            _ => Err(RuleError::UnknownUserAccessType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroupRule {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub priority: i32,
    pub rw_access_type: RwAccessType,
    pub user_access_type: UserAccessType,
    /// Client address or CIDR
    pub source: String,
}

impl AccessGroupRule {
    pub fn new(
        source: impl Into<String>,
        rw_access_type: RwAccessType,
        user_access_type: UserAccessType,
    ) -> Self {
        Self {
            id: None,
            external_id: None,
            priority: 0,
            rw_access_type,
            user_access_type,
            source: source.into(),
        }
    }
}

impl fmt::Display for AccessGroupRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.rw_access_type, self.user_access_type, self.source)
    }
}

impl Comparable for AccessGroupRule {
    fn canonical_key(&self) -> String {
        self.to_string()
    }
}

impl Identifiable for AccessGroupRule {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn set_external_id(&mut self, external_id: Option<String>) {
        self.external_id = external_id;
    }
}

impl Prioritized for AccessGroupRule {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }
}

/// An access group's rules together with the provider's priority constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroupRuleInfo {
    pub min_priority: i32,
    pub max_priority: i32,
    #[serde(default = "all_user_access_types")]
    pub supported_user_access_types: Vec<UserAccessType>,
    #[serde(default)]
    pub rules: Vec<AccessGroupRule>,
}

fn all_user_access_types() -> Vec<UserAccessType> {
    UserAccessType::ALL.to_vec()
}

impl AccessGroupRuleInfo {
    /// Bounds listed as `min > max` describe a descending provider.
    pub fn priority_order(&self) -> PriorityOrder {
        if self.min_priority <= self.max_priority {
            PriorityOrder::Ascending
        } else {
            PriorityOrder::Descending
        }
    }

    pub fn supports(&self, user_access_type: UserAccessType) -> bool {
        self.supported_user_access_types.contains(&user_access_type)
    }

    /// Sort rules in evaluation order, ties by canonical key.
    pub fn sort(&mut self) {
        let descending = self.priority_order() == PriorityOrder::Descending;
        self.rules.sort_by_cached_key(|r| {
            let rank = if descending { -i64::from(r.priority) } else { i64::from(r.priority) };
            (rank, r.canonical_key())
        });
    }
}

/// Next priority after `init` for an access-group insertion.
///
/// Bounds given as `max < min` count downwards. A value already on or past
/// either bound is returned unchanged, so a full window keeps handing out the
/// bound.
pub fn add_priority(init: i32, min: i32, max: i32) -> i32 {
    let (min, max, inc) = if max < min { (max, min, -1) } else { (min, max, 1) };
    if init >= max || init <= min {
        return init;
    }
    init + inc
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroupRuleDiff {
    pub common: Vec<AccessGroupRule>,
    pub added: Vec<AccessGroupRule>,
    pub removed: Vec<AccessGroupRule>,
}

impl AccessGroupRuleDiff {
    pub fn is_converged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

struct AccessGroupMerge<'a> {
    supported: &'a [UserAccessType],
    /// Remote priority of every matched key
    anchors: HashMap<String, i32>,
}

impl MergePolicy<AccessGroupRule> for AccessGroupMerge<'_> {
    fn matched(&mut self, local: AccessGroupRule, mut remote: AccessGroupRule) -> Matched<AccessGroupRule> {
        self.anchors.insert(remote.canonical_key(), remote.priority);
        remote.id = local.id;
        Matched::Common(remote)
    }

    fn admit(&mut self, local: AccessGroupRule) -> Option<AccessGroupRule> {
        self.supported.contains(&local.user_access_type).then_some(local)
    }
}

/// Diff local access-group rules against a provider's.
///
/// Local rules whose user access type the remote does not support are dropped
/// silently. Common rules are the remote rules carrying the local `id`. Added
/// rules get priorities counted from the closest matched rule before them.
pub fn compare_access_group_rules(
    local: AccessGroupRuleInfo,
    remote: AccessGroupRuleInfo,
    debug: bool,
) -> AccessGroupRuleDiff {
    let mut local = local;
    local.sort();
    let walk_order: Vec<String> = local.rules.iter().map(|r| r.canonical_key()).collect();

    let (min, max) = (remote.min_priority, remote.max_priority);
    let mut local_rules = local.rules;
    let mut remote_rules = remote.rules;
    local_rules.sort_by_cached_key(|r| r.canonical_key());
    remote_rules.sort_by_cached_key(|r| r.canonical_key());
    tracing::debug!(
        local = local_rules.len(),
        remote = remote_rules.len(),
        min,
        max,
        "comparing access group rules"
    );

    let mut policy = AccessGroupMerge {
        supported: &remote.supported_user_access_types,
        anchors: HashMap::new(),
    };
    let outcome = merge_sorted(local_rules, remote_rules, &mut policy, debug);

    let mut pending: HashMap<String, Vec<AccessGroupRule>> = HashMap::new();
    for rule in outcome.added {
        pending.entry(rule.canonical_key()).or_default().push(rule);
    }
    let mut priority = (min + max) / 2;
    let mut added = Vec::new();
    for key in &walk_order {
        if let Some(anchor) = policy.anchors.get(key) {
            priority = *anchor;
            continue;
        }
        if let Some(rules) = pending.get_mut(key) {
            if !rules.is_empty() {
                let mut rule = rules.remove(0);
                priority = add_priority(priority, min, max);
                rule.priority = priority;
                added.push(rule);
            }
        }
    }
    for key in &walk_order {
        for mut rule in pending.remove(key).unwrap_or_default() {
            priority = add_priority(priority, min, max);
            rule.priority = priority;
            added.push(rule);
        }
    }

    AccessGroupRuleDiff {
        common: outcome.common,
        added,
        removed: outcome.removed,
    }
}
