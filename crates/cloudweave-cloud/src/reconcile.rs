//! Reconciliation loop
//!
//! One cycle lists the remote state, compares it with the desired rules,
//! turns the diff into a [`Plan`] and hands the diff to the provider. A cycle
//! holds the resource lock from the listing to the end of the apply, and a
//! failed cycle is retried from scratch since the remote may have moved.

use crate::action::{ApplyResult, Plan, ResourceKind};
use crate::error::{CloudError, Result};
use crate::lock::ResourceLocks;
use crate::profile::{ProviderProfile, SecurityGroupProfile};
use crate::provider::{AccessGroupApi, DnsZoneApi, RetryConfig, SecurityGroupApi};
use crate::registry::ProviderRegistry;
use cloudweave_rules::{
    AccessGroupRule, AccessGroupRuleInfo, DnsRecordSet, SecurityRule, UserAccessType,
    compare_access_group_rules, compare_dns_record_sets, compare_rules,
};
use futures_util::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::sleep;

/// Outcome of one successful reconciliation
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub provider: String,
    pub kind: ResourceKind,
    pub resource_id: String,
    pub plan: Plan,
    pub result: ApplyResult,
    /// Cycles run, the successful one included
    pub attempts: u32,
}

pub struct Reconciler {
    registry: Arc<ProviderRegistry>,
    locks: ResourceLocks,
    retry: RetryConfig,
    holder: String,
    debug: bool,
}

impl Reconciler {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            locks: ResourceLocks::new(),
            retry: RetryConfig::default(),
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            debug: false,
        }
    }

    /// Share a lock table with other reconcilers of this process.
    pub fn with_locks(mut self, locks: ResourceLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Log every merge decision at info level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    async fn retrying<F, Fut>(&self, resource: &str, mut cycle: F) -> Result<(Plan, ApplyResult, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(Plan, ApplyResult)>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match cycle().await {
                Ok((plan, result)) => return Ok((plan, result, attempt + 1)),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Reconciling {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        resource,
                        attempt + 1,
                        max_attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn report(
        provider: &str,
        kind: ResourceKind,
        resource_id: &str,
        (plan, result, attempts): (Plan, ApplyResult, u32),
    ) -> SyncReport {
        tracing::info!(
            "Reconciled {} {} on {}: {}",
            kind,
            resource_id,
            provider,
            plan.summary()
        );
        SyncReport {
            provider: provider.to_string(),
            kind,
            resource_id: resource_id.to_string(),
            plan,
            result,
            attempts,
        }
    }

    fn profile_for(&self, provider: &str) -> Result<&ProviderProfile> {
        self.registry.profile(provider)
    }

    fn unsupported(provider: &str, kind: ResourceKind) -> CloudError {
        CloudError::UnsupportedResource {
            provider: provider.to_string(),
            kind,
        }
    }

    #[tracing::instrument(skip(self, local), fields(rules = local.len()))]
    pub async fn sync_security_group(
        &self,
        provider: &str,
        group_id: &str,
        local: Vec<SecurityRule>,
    ) -> Result<SyncReport> {
        let kind = ResourceKind::SecurityGroup;
        let client = self.registry.get(provider)?;
        let api = client
            .security_groups()
            .ok_or_else(|| Self::unsupported(provider, kind))?;
        let profile = self
            .profile_for(provider)?
            .security_group
            .as_ref()
            .ok_or_else(|| Self::unsupported(provider, kind))?;

        let _guard = self.locks.acquire(kind, group_id, &self.holder).await;
        let local = &local;
        let outcome = self
            .retrying(group_id, move || {
                self.security_group_cycle(api, profile, group_id, local)
            })
            .await?;
        Ok(Self::report(provider, kind, group_id, outcome))
    }

    async fn security_group_cycle(
        &self,
        api: &dyn SecurityGroupApi,
        profile: &SecurityGroupProfile,
        group_id: &str,
        local: &[SecurityRule],
    ) -> Result<(Plan, ApplyResult)> {
        let remote = api.list_rules(group_id).await?;
        tracing::debug!("Listed {} remote rules of {}", remote.len(), group_id);

        let diff = compare_rules(
            &profile.window,
            local.to_vec(),
            remote,
            &profile.default_in,
            &profile.default_out,
            profile.only_allow_rules,
            self.debug,
        );
        let plan = Plan::from_secgroup_diff(group_id, &diff);
        if diff.is_converged() {
            return Ok((plan, ApplyResult::new()));
        }

        let result = api.apply_rules(group_id, &diff).await?;
        check_applied(group_id, &result)?;
        Ok((plan, result))
    }

    /// Reconcile several groups of one provider concurrently.
    pub async fn sync_security_groups(
        &self,
        provider: &str,
        groups: Vec<(String, Vec<SecurityRule>)>,
    ) -> Vec<Result<SyncReport>> {
        join_all(
            groups
                .into_iter()
                .map(|(group_id, local)| async move {
                    self.sync_security_group(provider, &group_id, local).await
                }),
        )
        .await
    }

    #[tracing::instrument(skip(self, local), fields(records = local.len()))]
    pub async fn sync_dns_zone(
        &self,
        provider: &str,
        zone_id: &str,
        local: Vec<DnsRecordSet>,
    ) -> Result<SyncReport> {
        let kind = ResourceKind::DnsZone;
        let client = self.registry.get(provider)?;
        let api = client
            .dns_zones()
            .ok_or_else(|| Self::unsupported(provider, kind))?;
        let local = match &self.profile_for(provider)?.dns {
            Some(profile) => profile.fit(local),
            None => local,
        };

        let _guard = self.locks.acquire(kind, zone_id, &self.holder).await;
        let local = &local;
        let outcome = self
            .retrying(zone_id, move || self.dns_zone_cycle(api, zone_id, local))
            .await?;
        Ok(Self::report(provider, kind, zone_id, outcome))
    }

    async fn dns_zone_cycle(
        &self,
        api: &dyn DnsZoneApi,
        zone_id: &str,
        local: &[DnsRecordSet],
    ) -> Result<(Plan, ApplyResult)> {
        let remote = api.list_record_sets(zone_id).await?;
        tracing::debug!("Listed {} remote record sets of {}", remote.len(), zone_id);

        let diff = compare_dns_record_sets(&remote, local.to_vec(), self.debug);
        let plan = Plan::from_dns_diff(zone_id, &diff);
        if diff.is_converged() {
            return Ok((plan, ApplyResult::new()));
        }

        let result = api.apply_record_sets(zone_id, &diff).await?;
        check_applied(zone_id, &result)?;
        Ok((plan, result))
    }

    #[tracing::instrument(skip(self, local), fields(rules = local.len()))]
    pub async fn sync_access_group(
        &self,
        provider: &str,
        group_id: &str,
        local: Vec<AccessGroupRule>,
    ) -> Result<SyncReport> {
        let kind = ResourceKind::AccessGroup;
        let client = self.registry.get(provider)?;
        let api = client
            .access_groups()
            .ok_or_else(|| Self::unsupported(provider, kind))?;
        let supported = self
            .profile_for(provider)?
            .access_group
            .as_ref()
            .map(|p| p.supported_user_access_types.as_slice());

        let _guard = self.locks.acquire(kind, group_id, &self.holder).await;
        let local = &local;
        let outcome = self
            .retrying(group_id, move || {
                self.access_group_cycle(api, supported, group_id, local)
            })
            .await?;
        Ok(Self::report(provider, kind, group_id, outcome))
    }

    async fn access_group_cycle(
        &self,
        api: &dyn AccessGroupApi,
        supported: Option<&[UserAccessType]>,
        group_id: &str,
        local: &[AccessGroupRule],
    ) -> Result<(Plan, ApplyResult)> {
        let mut remote = api.rule_info(group_id).await?;
        if let Some(supported) = supported {
            remote
                .supported_user_access_types
                .retain(|t| supported.contains(t));
        }
        tracing::debug!("Listed {} remote access rules of {}", remote.rules.len(), group_id);

        let desired = AccessGroupRuleInfo {
            min_priority: remote.min_priority,
            max_priority: remote.max_priority,
            supported_user_access_types: remote.supported_user_access_types.clone(),
            rules: local.to_vec(),
        };
        let diff = compare_access_group_rules(desired, remote, self.debug);
        let plan = Plan::from_access_group_diff(group_id, &diff);
        if diff.is_converged() {
            return Ok((plan, ApplyResult::new()));
        }

        let result = api.sync_rules(group_id, &diff).await?;
        check_applied(group_id, &result)?;
        Ok((plan, result))
    }
}

fn check_applied(resource: &str, result: &ApplyResult) -> Result<()> {
    if result.is_success() {
        return Ok(());
    }
    for failure in &result.failed {
        tracing::warn!(
            "{}: {}",
            failure.action_id,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    Err(CloudError::ApplyFailed {
        resource: resource.to_string(),
        failed: result.failed.len(),
    })
}
