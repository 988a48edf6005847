//! In-memory provider
//!
//! Keeps remote state in maps and applies diffs to them. Used to reconcile
//! offline snapshots and as the provider in tests.

use crate::action::{ApplyResult, ResourceKind};
use crate::error::{CloudError, Result};
use crate::profile::ProviderProfile;
use crate::provider::{AccessGroupApi, CloudProvider, DnsZoneApi, SecurityGroupApi};
use async_trait::async_trait;
use cloudweave_rules::{
    AccessGroupRuleDiff, AccessGroupRuleInfo, DnsRecordSet, DnsRecordSetDiff, Identifiable,
    SecurityRule, SecurityRuleDiff,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

/// Drop the items carrying `external_id`. Returns false when nothing matched,
/// including when there is no id to match on.
fn remove_by_external_id<T: Identifiable>(items: &mut Vec<T>, external_id: Option<&str>) -> bool {
    let Some(external_id) = external_id else {
        return false;
    };
    let before = items.len();
    items.retain(|item| item.external_id() != Some(external_id));
    items.len() < before
}

pub struct MemoryProvider {
    profile: ProviderProfile,
    groups: Mutex<HashMap<String, Vec<SecurityRule>>>,
    zones: Mutex<HashMap<String, Vec<DnsRecordSet>>>,
    access: Mutex<HashMap<String, AccessGroupRuleInfo>>,
    next_id: AtomicU32,
    pending_failures: AtomicU32,
    list_calls: AtomicU32,
}

impl MemoryProvider {
    pub fn new(profile: ProviderProfile) -> Self {
        Self {
            profile,
            groups: Mutex::new(HashMap::new()),
            zones: Mutex::new(HashMap::new()),
            access: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            pending_failures: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
        }
    }

    /// Make the next `count` list calls fail with a retryable API error.
    pub fn fail_next_lists(self, count: u32) -> Self {
        self.pending_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn next_external_id(&self, kind: ResourceKind) -> String {
        format!("{}-{}", kind, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn assign_ids<T: Identifiable>(&self, kind: ResourceKind, items: &mut [T]) {
        for item in items.iter_mut().filter(|i| i.external_id().is_none()) {
            item.set_external_id(Some(self.next_external_id(kind)));
        }
    }

    fn list_call(&self) -> Result<()> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CloudError::ApiError(format!("{}: request throttled", self.profile.name)));
        }
        Ok(())
    }

    /// Replace the rules of a group. Rules without an external id get one.
    pub async fn set_security_group(&self, group_id: &str, mut rules: Vec<SecurityRule>) {
        self.assign_ids(ResourceKind::SecurityGroup, &mut rules);
        self.groups.lock().await.insert(group_id.to_string(), rules);
    }

    pub async fn security_group(&self, group_id: &str) -> Vec<SecurityRule> {
        self.groups
            .lock()
            .await
            .get(group_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_zone(&self, zone_id: &str, mut records: Vec<DnsRecordSet>) {
        self.assign_ids(ResourceKind::DnsZone, &mut records);
        self.zones.lock().await.insert(zone_id.to_string(), records);
    }

    pub async fn zone(&self, zone_id: &str) -> Vec<DnsRecordSet> {
        self.zones
            .lock()
            .await
            .get(zone_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_access_group(&self, group_id: &str, mut info: AccessGroupRuleInfo) {
        self.assign_ids(ResourceKind::AccessGroup, &mut info.rules);
        self.access.lock().await.insert(group_id.to_string(), info);
    }

    pub async fn access_group(&self, group_id: &str) -> Option<AccessGroupRuleInfo> {
        self.access.lock().await.get(group_id).cloned()
    }
}

impl CloudProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn display_name(&self) -> &str {
        &self.profile.display_name
    }

    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    fn security_groups(&self) -> Option<&dyn SecurityGroupApi> {
        self.profile
            .security_group
            .as_ref()
            .map(|_| self as &dyn SecurityGroupApi)
    }

    fn dns_zones(&self) -> Option<&dyn DnsZoneApi> {
        self.profile.dns.as_ref().map(|_| self as &dyn DnsZoneApi)
    }

    fn access_groups(&self) -> Option<&dyn AccessGroupApi> {
        self.profile
            .access_group
            .as_ref()
            .map(|_| self as &dyn AccessGroupApi)
    }
}

#[async_trait]
impl SecurityGroupApi for MemoryProvider {
    async fn list_rules(&self, group_id: &str) -> Result<Vec<SecurityRule>> {
        self.list_call()?;
        Ok(self.security_group(group_id).await)
    }

    async fn apply_rules(&self, group_id: &str, diff: &SecurityRuleDiff) -> Result<ApplyResult> {
        let mut groups = self.groups.lock().await;
        let rules = groups.entry(group_id.to_string()).or_default();
        let mut result = ApplyResult::new();
        for del in diff.dels() {
            if remove_by_external_id(rules, del.external_id()) {
                result.add_success(del.to_string(), "deleted");
            } else {
                result.add_failure(del.to_string(), "no such rule");
            }
        }
        for add in diff.adds() {
            let mut rule = add.clone();
            rule.set_external_id(Some(self.next_external_id(ResourceKind::SecurityGroup)));
            result.add_success(rule.to_string(), format!("created at priority {}", rule.priority));
            rules.push(rule);
        }
        Ok(result)
    }
}

#[async_trait]
impl DnsZoneApi for MemoryProvider {
    async fn list_record_sets(&self, zone_id: &str) -> Result<Vec<DnsRecordSet>> {
        self.list_call()?;
        Ok(self.zone(zone_id).await)
    }

    async fn apply_record_sets(&self, zone_id: &str, diff: &DnsRecordSetDiff) -> Result<ApplyResult> {
        let mut zones = self.zones.lock().await;
        let records = zones.entry(zone_id.to_string()).or_default();
        let mut result = ApplyResult::new();
        for del in &diff.removed {
            if remove_by_external_id(records, del.external_id()) {
                result.add_success(del.to_string(), "deleted");
            } else {
                result.add_failure(del.to_string(), "no such record");
            }
        }
        for update in &diff.updated {
            match records
                .iter_mut()
                .find(|r| r.external_id == update.external_id)
            {
                Some(record) => {
                    *record = update.clone();
                    result.add_success(update.to_string(), "updated");
                }
                None => result.add_failure(update.to_string(), "record vanished"),
            }
        }
        for add in &diff.added {
            let mut record = add.clone();
            record.set_external_id(Some(self.next_external_id(ResourceKind::DnsZone)));
            result.add_success(record.to_string(), "created");
            records.push(record);
        }
        Ok(result)
    }
}

#[async_trait]
impl AccessGroupApi for MemoryProvider {
    async fn rule_info(&self, group_id: &str) -> Result<AccessGroupRuleInfo> {
        self.list_call()?;
        if let Some(info) = self.access_group(group_id).await {
            return Ok(info);
        }
        let bounds = self.profile.access_group.as_ref().ok_or_else(|| {
            CloudError::UnsupportedResource {
                provider: self.profile.name.clone(),
                kind: ResourceKind::AccessGroup,
            }
        })?;
        Ok(AccessGroupRuleInfo {
            min_priority: bounds.min_priority,
            max_priority: bounds.max_priority,
            supported_user_access_types: bounds.supported_user_access_types.clone(),
            rules: Vec::new(),
        })
    }

    async fn sync_rules(&self, group_id: &str, diff: &AccessGroupRuleDiff) -> Result<ApplyResult> {
        let mut access = self.access.lock().await;
        let bounds = self.profile.access_group.as_ref();
        let info = access
            .entry(group_id.to_string())
            .or_insert_with(|| AccessGroupRuleInfo {
                min_priority: bounds.map_or(1, |b| b.min_priority),
                max_priority: bounds.map_or(100, |b| b.max_priority),
                supported_user_access_types: bounds
                    .map(|b| b.supported_user_access_types.clone())
                    .unwrap_or_default(),
                rules: Vec::new(),
            });
        let mut result = ApplyResult::new();
        for del in &diff.removed {
            if remove_by_external_id(&mut info.rules, del.external_id()) {
                result.add_success(del.to_string(), "deleted");
            } else {
                result.add_failure(del.to_string(), "no such rule");
            }
        }
        for add in &diff.added {
            let mut rule = add.clone();
            rule.set_external_id(Some(self.next_external_id(ResourceKind::AccessGroup)));
            result.add_success(rule.to_string(), format!("created at priority {}", rule.priority));
            info.rules.push(rule);
        }
        Ok(result)
    }
}
