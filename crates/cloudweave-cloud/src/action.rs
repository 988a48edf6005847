//! Action types for rule reconciliation

use cloudweave_rules::{
    AccessGroupRule, AccessGroupRuleDiff, Comparable, DnsRecordSet, DnsRecordSetDiff,
    SecurityRule, SecurityRuleDiff,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of resource whose rules are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    SecurityGroup,
    DnsZone,
    AccessGroup,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::SecurityGroup => write!(f, "security-group"),
            ResourceKind::DnsZone => write!(f, "dns-zone"),
            ResourceKind::AccessGroup => write!(f, "access-group"),
        }
    }
}

/// Represents a planned change to one rule or record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier for the action within its plan
    pub id: String,

    pub action_type: ActionType,

    pub resource_kind: ResourceKind,

    /// Security group, zone or access group the rule belongs to
    pub resource_id: String,

    /// Canonical key of the rule or record
    pub description: String,

    /// Priority, external id and other attributes of the change
    pub details: HashMap<String, serde_json::Value>,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new rule
    Create,
    /// Update an existing rule in place
    Update,
    /// Delete a rule
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Result of applying a diff
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub succeeded: Vec<ActionResult>,

    pub failed: Vec<ActionResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, action_id: impl Into<String>, message: impl Into<String>) {
        self.succeeded.push(ActionResult {
            action_id: action_id.into(),
            success: true,
            message: message.into(),
            error: None,
        });
    }

    pub fn add_failure(&mut self, action_id: impl Into<String>, error: impl Into<String>) {
        self.failed.push(ActionResult {
            action_id: action_id.into(),
            success: false,
            message: String::new(),
            error: Some(error.into()),
        });
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,

    pub success: bool,

    pub message: String,

    pub error: Option<String>,
}

/// Plan containing every change a diff implies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

struct PlanBuilder {
    kind: ResourceKind,
    resource_id: String,
    actions: Vec<Action>,
}

impl PlanBuilder {
    fn new(kind: ResourceKind, resource_id: &str) -> Self {
        Self {
            kind,
            resource_id: resource_id.to_string(),
            actions: Vec::new(),
        }
    }

    fn push(&mut self, action_type: ActionType, key: String, details: HashMap<String, serde_json::Value>) {
        let id = format!("{}/{}#{}", self.resource_id, action_type, self.actions.len());
        self.actions.push(Action {
            id,
            action_type,
            resource_kind: self.kind,
            resource_id: self.resource_id.clone(),
            description: key,
            details,
        });
    }

    fn security_rule(&mut self, action_type: ActionType, rule: &SecurityRule) {
        let mut details = HashMap::new();
        details.insert("direction".to_string(), serde_json::json!(rule.direction.to_string()));
        details.insert("priority".to_string(), serde_json::json!(rule.priority));
        if let Some(external_id) = &rule.external_id {
            details.insert("external_id".to_string(), serde_json::json!(external_id));
        }
        if rule.origin.is_synthesized() {
            details.insert("synthesized_default".to_string(), serde_json::json!(true));
        }
        self.push(action_type, rule.canonical_key(), details);
    }

    fn record(&mut self, action_type: ActionType, record: &DnsRecordSet) {
        let mut details = HashMap::new();
        details.insert("ttl".to_string(), serde_json::json!(record.ttl));
        details.insert("enabled".to_string(), serde_json::json!(record.enabled));
        if let Some(external_id) = &record.external_id {
            details.insert("external_id".to_string(), serde_json::json!(external_id));
        }
        self.push(action_type, record.canonical_key(), details);
    }

    fn access_rule(&mut self, action_type: ActionType, rule: &AccessGroupRule) {
        let mut details = HashMap::new();
        details.insert("priority".to_string(), serde_json::json!(rule.priority));
        if let Some(external_id) = &rule.external_id {
            details.insert("external_id".to_string(), serde_json::json!(external_id));
        }
        self.push(action_type, rule.canonical_key(), details);
    }

    fn build(self) -> Plan {
        Plan::new(self.actions)
    }
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
        }
    }

    /// Deletions come first so a replaced rule frees its priority slot.
    pub fn from_secgroup_diff(group_id: &str, diff: &SecurityRuleDiff) -> Self {
        let mut plan = PlanBuilder::new(ResourceKind::SecurityGroup, group_id);
        for rule in diff.dels() {
            plan.security_rule(ActionType::Delete, rule);
        }
        for rule in diff.adds() {
            plan.security_rule(ActionType::Create, rule);
        }
        for rule in &diff.common {
            plan.security_rule(ActionType::NoOp, rule);
        }
        plan.build()
    }

    pub fn from_dns_diff(zone_id: &str, diff: &DnsRecordSetDiff) -> Self {
        let mut plan = PlanBuilder::new(ResourceKind::DnsZone, zone_id);
        for record in &diff.removed {
            plan.record(ActionType::Delete, record);
        }
        for record in &diff.added {
            plan.record(ActionType::Create, record);
        }
        for record in &diff.updated {
            plan.record(ActionType::Update, record);
        }
        for record in &diff.common {
            plan.record(ActionType::NoOp, record);
        }
        plan.build()
    }

    pub fn from_access_group_diff(group_id: &str, diff: &AccessGroupRuleDiff) -> Self {
        let mut plan = PlanBuilder::new(ResourceKind::AccessGroup, group_id);
        for rule in &diff.removed {
            plan.access_rule(ActionType::Delete, rule);
        }
        for rule in &diff.added {
            plan.access_rule(ActionType::Create, rule);
        }
        for rule in &diff.common {
            plan.access_rule(ActionType::NoOp, rule);
        }
        plan.build()
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudweave_rules::DnsType;

    #[test]
    fn test_secgroup_plan() {
        let diff = SecurityRuleDiff {
            common: vec![SecurityRule::parse("in:allow tcp 22").unwrap()],
            in_adds: vec![SecurityRule::parse("in:allow tcp 443").unwrap().with_priority(49)],
            out_adds: vec![],
            in_dels: vec![
                SecurityRule::parse("in:allow tcp 3389")
                    .unwrap()
                    .with_external_id("r-7"),
            ],
            out_dels: vec![],
        };
        let plan = Plan::from_secgroup_diff("sg-1", &diff);
        assert!(plan.has_changes);
        assert_eq!(plan.actions[0].action_type, ActionType::Delete);
        assert_eq!(plan.actions[0].details["external_id"], serde_json::json!("r-7"));
        assert_eq!(plan.actions[1].description, "in:allow tcp 443");
        assert_eq!(plan.actions[1].details["priority"], serde_json::json!(49));
        assert_eq!(
            plan.summary().to_string(),
            "1 to create, 0 to update, 1 to delete, 1 unchanged"
        );
    }

    #[test]
    fn test_converged_plan_has_no_changes() {
        let diff = DnsRecordSetDiff {
            common: vec![DnsRecordSet::new("www", DnsType::A, "1.2.3.4")],
            ..Default::default()
        };
        let plan = Plan::from_dns_diff("zone-1", &diff);
        assert!(!plan.has_changes);
        assert_eq!(plan.actions[0].resource_kind, ResourceKind::DnsZone);
        assert_eq!(plan.actions[0].id, "zone-1/no-op#0");
    }

    #[test]
    fn test_apply_result() {
        let mut result = ApplyResult::new();
        result.add_success("a", "created");
        assert!(result.is_success());
        result.add_failure("b", "quota exceeded");
        assert!(!result.is_success());
        assert_eq!(result.failed[0].error.as_deref(), Some("quota exceeded"));
    }
}
