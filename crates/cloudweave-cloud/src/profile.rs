//! Provider capability profiles
//!
//! A profile records what a provider's rule APIs accept: the priority window
//! and ordering of security groups, whether only allow rules exist, which
//! trailing rules the provider applies implicitly, NAS user-access types and
//! DNS TTL constraints.

use cloudweave_rules::{
    DnsPolicyType, DnsRecordSet, PriorityOrder, PriorityWindow, Result as RuleResult,
    SecurityRule, TtlRange, UserAccessType,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupProfile {
    pub window: PriorityWindow,

    /// Provider only accepts allow rules
    #[serde(default)]
    pub only_allow_rules: bool,

    /// Implicit trailing inbound rule
    pub default_in: SecurityRule,

    /// Implicit trailing outbound rule
    pub default_out: SecurityRule,
}

impl SecurityGroupProfile {
    pub fn new(min: i32, max: i32, order: PriorityOrder) -> RuleResult<Self> {
        Ok(Self {
            window: PriorityWindow::new(min, max, order),
            only_allow_rules: false,
            default_in: SecurityRule::parse("in:deny any")?,
            default_out: SecurityRule::parse("out:allow any")?,
        })
    }

    pub fn only_allow(mut self) -> Self {
        self.only_allow_rules = true;
        self
    }

    pub fn with_defaults(mut self, default_in: &str, default_out: &str) -> RuleResult<Self> {
        self.default_in = SecurityRule::parse(default_in)?;
        self.default_out = SecurityRule::parse(default_out)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroupProfile {
    /// May exceed `max_priority` for providers that count downwards
    pub min_priority: i32,
    pub max_priority: i32,
    pub supported_user_access_types: Vec<UserAccessType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsProfile {
    pub ttl_range: TtlRange,
    pub policy_types: Vec<DnsPolicyType>,
}

impl DnsProfile {
    /// Bring desired records in line with what the DNS product stores.
    ///
    /// TTLs snap to the supported range; records with an unsupported policy
    /// type are dropped.
    pub fn fit(&self, records: Vec<DnsRecordSet>) -> Vec<DnsRecordSet> {
        records
            .into_iter()
            .filter_map(|mut record| {
                if !self.policy_types.contains(&record.policy_type) {
                    tracing::warn!(
                        "Dropping {}: policy type {} not supported",
                        record,
                        record.policy_type
                    );
                    return None;
                }
                record.ttl = self.ttl_range.supported_ttl(record.ttl);
                Some(record)
            })
            .collect()
    }
}

/// Everything the reconciler needs to know about one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Provider name (e.g. "aliyun", "aws")
    pub name: String,

    /// Name shown to users
    pub display_name: String,

    #[serde(default)]
    pub security_group: Option<SecurityGroupProfile>,

    #[serde(default)]
    pub access_group: Option<AccessGroupProfile>,

    #[serde(default)]
    pub dns: Option<DnsProfile>,
}

impl ProviderProfile {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            security_group: None,
            access_group: None,
            dns: None,
        }
    }

    pub fn with_security_group(mut self, profile: SecurityGroupProfile) -> Self {
        self.security_group = Some(profile);
        self
    }

    pub fn with_access_group(mut self, profile: AccessGroupProfile) -> Self {
        self.access_group = Some(profile);
        self
    }

    pub fn with_dns(mut self, profile: DnsProfile) -> Self {
        self.dns = Some(profile);
        self
    }
}

fn all_user_access_types() -> Vec<UserAccessType> {
    UserAccessType::ALL.to_vec()
}

/// Profiles of the providers cloudweave knows out of the box
pub fn builtin_profiles() -> RuleResult<Vec<ProviderProfile>> {
    use PriorityOrder::{Ascending, Descending};

    Ok(vec![
        ProviderProfile::new("aliyun", "Alibaba Cloud")
            .with_security_group(SecurityGroupProfile::new(1, 100, Ascending)?)
            .with_access_group(AccessGroupProfile {
                min_priority: 1,
                max_priority: 100,
                supported_user_access_types: all_user_access_types(),
            })
            .with_dns(DnsProfile {
                ttl_range: TtlRange::ALIYUN_FREE,
                policy_types: vec![
                    DnsPolicyType::Simple,
                    DnsPolicyType::ByCarrier,
                    DnsPolicyType::BySearchEngine,
                    DnsPolicyType::ByGeoLocation,
                ],
            }),
        ProviderProfile::new("aliyun-pvtz", "Alibaba Cloud PrivateZone").with_dns(DnsProfile {
            ttl_range: TtlRange::aliyun_pvtz(),
            policy_types: vec![DnsPolicyType::Simple],
        }),
        ProviderProfile::new("aws", "Amazon Web Services")
            .with_security_group(SecurityGroupProfile::new(1, 100, Ascending)?.only_allow())
            .with_dns(DnsProfile {
                ttl_range: TtlRange::Continuous {
                    min: 0,
                    max: 2_147_483_647,
                },
                policy_types: vec![
                    DnsPolicyType::Simple,
                    DnsPolicyType::Weighted,
                    DnsPolicyType::Failover,
                    DnsPolicyType::Latency,
                    DnsPolicyType::ByGeoLocation,
                    DnsPolicyType::MultiValueAnswer,
                ],
            }),
        ProviderProfile::new("azure", "Microsoft Azure")
            .with_security_group(SecurityGroupProfile::new(100, 4096, Ascending)?),
        ProviderProfile::new("google", "Google Cloud")
            .with_security_group(SecurityGroupProfile::new(0, 65535, Ascending)?),
        ProviderProfile::new("huawei", "Huawei Cloud")
            .with_security_group(SecurityGroupProfile::new(1, 100, Ascending)?)
            .with_access_group(AccessGroupProfile {
                min_priority: 1,
                max_priority: 400,
                supported_user_access_types: vec![
                    UserAccessType::RootSquash,
                    UserAccessType::NoRootSquash,
                ],
            }),
        ProviderProfile::new("qcloud", "Tencent Cloud")
            .with_security_group(SecurityGroupProfile::new(0, 100, Ascending)?)
            .with_dns(DnsProfile {
                ttl_range: TtlRange::QCLOUD_FREE,
                policy_types: vec![
                    DnsPolicyType::Simple,
                    DnsPolicyType::ByCarrier,
                    DnsPolicyType::BySearchEngine,
                    DnsPolicyType::Weighted,
                ],
            }),
        ProviderProfile::new("openstack", "OpenStack")
            .with_security_group(SecurityGroupProfile::new(1, 100, Ascending)?.only_allow()),
        ProviderProfile::new("onecloud", "OneCloud")
            .with_security_group(SecurityGroupProfile::new(1, 100, Descending)?)
            .with_access_group(AccessGroupProfile {
                min_priority: 100,
                max_priority: 1,
                supported_user_access_types: all_user_access_types(),
            }),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudweave_rules::DnsType;

    #[test]
    fn test_builtin_profiles_are_consistent() {
        let profiles = builtin_profiles().unwrap();
        let mut names: Vec<_> = profiles.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), profiles.len(), "duplicate profile name");

        for profile in &profiles {
            if let Some(sg) = &profile.security_group {
                assert!(sg.window.min <= sg.window.max, "{}", profile.name);
                assert_eq!(sg.default_in.to_string(), "in:deny any");
                assert_eq!(sg.default_out.to_string(), "out:allow any");
            }
        }
    }

    #[test]
    fn test_only_allow_providers() {
        let profiles = builtin_profiles().unwrap();
        let only_allow: Vec<_> = profiles
            .iter()
            .filter(|p| p.security_group.as_ref().is_some_and(|sg| sg.only_allow_rules))
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(only_allow, vec!["aws", "openstack"]);
    }

    #[test]
    fn test_dns_fit() {
        let profile = DnsProfile {
            ttl_range: TtlRange::aliyun_pvtz(),
            policy_types: vec![DnsPolicyType::Simple],
        };
        let mut short = DnsRecordSet::new("a", DnsType::A, "10.0.0.1");
        short.ttl = 50;
        let mut weighted = DnsRecordSet::new("b", DnsType::A, "10.0.0.2");
        weighted.policy_type = DnsPolicyType::Weighted;

        let fitted = profile.fit(vec![short, weighted]);
        assert_eq!(fitted.len(), 1);
        assert_eq!(fitted[0].ttl, 60);
    }

    #[test]
    fn test_custom_defaults() {
        let sg = SecurityGroupProfile::new(1, 10, PriorityOrder::Ascending)
            .unwrap()
            .with_defaults("in:allow any", "out:allow any")
            .unwrap();
        assert_eq!(sg.default_in.to_string(), "in:allow any");
        assert!(
            SecurityGroupProfile::new(1, 10, PriorityOrder::Ascending)
                .unwrap()
                .with_defaults("nonsense", "out:allow any")
                .is_err()
        );
    }
}
