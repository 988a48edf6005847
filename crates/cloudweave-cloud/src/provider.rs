//! Cloud provider trait definitions
//!
//! A provider exposes one capability trait per resource kind it manages. The
//! reconciler only ever reads remote state and hands back a diff; how that
//! diff turns into API calls is the provider's business.

use crate::action::ApplyResult;
use crate::error::Result;
use crate::profile::ProviderProfile;
use async_trait::async_trait;
use cloudweave_rules::{
    AccessGroupRuleDiff, AccessGroupRuleInfo, DnsRecordSet, DnsRecordSetDiff, SecurityRule,
    SecurityRuleDiff,
};
use std::time::Duration;

/// Cloud provider abstraction trait
///
/// Capabilities a provider lacks return `None`.
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "aliyun", "aws")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    fn profile(&self) -> &ProviderProfile;

    fn security_groups(&self) -> Option<&dyn SecurityGroupApi> {
        None
    }

    fn dns_zones(&self) -> Option<&dyn DnsZoneApi> {
        None
    }

    fn access_groups(&self) -> Option<&dyn AccessGroupApi> {
        None
    }
}

#[async_trait]
pub trait SecurityGroupApi: Send + Sync {
    /// Rules currently attached to the group, with external ids and priorities
    async fn list_rules(&self, group_id: &str) -> Result<Vec<SecurityRule>>;

    /// Delete `in_dels`/`out_dels`, then create `in_adds`/`out_adds`.
    async fn apply_rules(&self, group_id: &str, diff: &SecurityRuleDiff) -> Result<ApplyResult>;
}

#[async_trait]
pub trait DnsZoneApi: Send + Sync {
    async fn list_record_sets(&self, zone_id: &str) -> Result<Vec<DnsRecordSet>>;

    async fn apply_record_sets(&self, zone_id: &str, diff: &DnsRecordSetDiff) -> Result<ApplyResult>;
}

#[async_trait]
pub trait AccessGroupApi: Send + Sync {
    /// Rules of the group together with the provider's priority bounds
    async fn rule_info(&self, group_id: &str) -> Result<AccessGroupRuleInfo>;

    async fn sync_rules(&self, group_id: &str, diff: &AccessGroupRuleDiff) -> Result<ApplyResult>;
}

/// Retry configuration for reconciliation cycles
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Run each cycle once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retrying after the zero-based `attempt` failed
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}
