//! DNS record-set model and reconciliation

use crate::error::RuleError;
use crate::merge::{Matched, MergePolicy, merge_sorted};
use crate::traits::{Comparable, Identifiable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

macro_rules! string_enum {
    (
        $(#[$meta:meta])* $name:ident, $err:ident {
            $($(#[$variant_meta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($(#[$variant_meta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RuleError;

            fn from_str(s: &str) -> Result<Self, RuleError> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| RuleError::$err(s.to_string()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = RuleError;

            fn try_from(s: String) -> Result<Self, RuleError> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.as_str().to_string()
            }
        }
    };
}

string_enum!(
    /// Record types that can be reconciled
    DnsType, UnknownDnsType {
        A => "A",
        Aaaa => "AAAA",
        Caa => "CAA",
        Cname => "CNAME",
        Mx => "MX",
        Ns => "NS",
        Srv => "SRV",
        Soa => "SOA",
        Txt => "TXT",
        Ptr => "PTR",
        Ds => "DS",
        Dnskey => "DNSKEY",
        Ipseckey => "IPSECKEY",
        Naptr => "NAPTR",
        Spf => "SPF",
        Sshfp => "SSHFP",
        Tlsa => "TLSA",
        RedirectUrl => "REDIRECT_URL",
        ForwardUrl => "FORWARD_URL",
    }
);

string_enum!(
    /// How a provider chooses between records of the same name
    #[derive(Default)]
    DnsPolicyType, UnknownPolicyType {
        #[default]
        Simple => "Simple",
        ByCarrier => "ByCarrier",
        ByGeoLocation => "ByGeoLocation",
        BySearchEngine => "BySearchEngine",
        IpRange => "IpRange",
        Weighted => "Weighted",
        Failover => "Failover",
        MultiValueAnswer => "MultiValueAnswer",
        Latency => "Latency",
    }
);

/// Public or VPC-scoped zone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnsZoneType {
    #[default]
    PublicZone,
    PrivateZone,
}

/// Policy parameter of a record: a carrier, region, search engine, weight...
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DnsPolicyValue(pub String);

impl DnsPolicyValue {
    pub const EMPTY: &'static str = "";

    pub const UNICOM: &'static str = "unicom";
    pub const TELECOM: &'static str = "telecom";
    pub const CHINA_MOBILE: &'static str = "chinamobile";
    pub const CERNET: &'static str = "cernet";
    pub const DR_PENG: &'static str = "drpeng";
    pub const BTVN: &'static str = "btvn";

    pub const OVERSEA: &'static str = "oversea";
    pub const MAINLAND: &'static str = "mainland";

    pub const BAIDU: &'static str = "baidu";
    pub const GOOGLE: &'static str = "google";
    pub const BING: &'static str = "bing";
    pub const YOUDAO: &'static str = "youdao";
    pub const SOUSOU: &'static str = "sousou";
    pub const SOUGOU: &'static str = "sougou";
    pub const QIHU360: &'static str = "qihu360";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this value appears in a provider's supported list.
    pub fn is_supported(&self, supported: &[&str]) -> bool {
        supported.contains(&self.0.as_str())
    }
}

impl fmt::Display for DnsPolicyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DnsPolicyValue {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Carrier lines understood by carrier-routing providers
pub const CARRIER_POLICY_VALUES: &[&str] = &[
    DnsPolicyValue::UNICOM,
    DnsPolicyValue::TELECOM,
    DnsPolicyValue::CHINA_MOBILE,
    DnsPolicyValue::CERNET,
    DnsPolicyValue::DR_PENG,
    DnsPolicyValue::BTVN,
];

pub const REGION_POLICY_VALUES: &[&str] = &[DnsPolicyValue::OVERSEA, DnsPolicyValue::MAINLAND];

pub const SEARCH_ENGINE_POLICY_VALUES: &[&str] = &[
    DnsPolicyValue::BAIDU,
    DnsPolicyValue::GOOGLE,
    DnsPolicyValue::BING,
    DnsPolicyValue::YOUDAO,
    DnsPolicyValue::SOUSOU,
    DnsPolicyValue::SOUGOU,
    DnsPolicyValue::QIHU360,
];

pub const AWS_FAILOVER_POLICY_VALUES: &[&str] = &["PRIMARY", "SECONDARY"];

pub const AWS_LATENCY_REGIONS: &[&str] = &[
    "us-east-2",
    "us-east-1",
    "us-west-1",
    "us-west-2",
    "af-south-1",
    "ap-east-1",
    "ap-south-1",
    "ap-northeast-3",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ca-central-1",
    "cn-north-1",
    "cn-northwest-1",
    "eu-central-1",
    "eu-west-1",
    "eu-west-2",
    "eu-south-1",
    "eu-west-3",
    "eu-north-1",
    "me-south-1",
    "sa-east-1",
    "us-gov-east-1",
    "us-gov-west-1",
];

/// TTL values a DNS product accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlRange {
    Continuous { min: i64, max: i64 },
    /// Sorted, non-empty
    Discrete(Vec<i64>),
}

impl TtlRange {
    pub const ALIYUN_ENTERPRISE_ULTIMATE: TtlRange = TtlRange::Continuous { min: 1, max: 86400 };
    pub const ALIYUN_ENTERPRISE_STANDARD: TtlRange = TtlRange::Continuous { min: 60, max: 86400 };
    pub const ALIYUN_PERSONAL: TtlRange = TtlRange::Continuous { min: 600, max: 86400 };
    pub const ALIYUN_FREE: TtlRange = TtlRange::Continuous { min: 600, max: 86400 };
    pub const QCLOUD_ENTERPRISE_ULTIMATE: TtlRange = TtlRange::Continuous { min: 1, max: 604800 };
    pub const QCLOUD_ENTERPRISE_STANDARD: TtlRange = TtlRange::Continuous { min: 30, max: 604800 };
    pub const QCLOUD_ENTERPRISE_BASIC: TtlRange = TtlRange::Continuous { min: 60, max: 604800 };
    pub const QCLOUD_PERSONAL_PROFESSIONAL: TtlRange = TtlRange::Continuous { min: 120, max: 604800 };
    pub const QCLOUD_FREE: TtlRange = TtlRange::Continuous { min: 600, max: 604800 };

    /// Alibaba Cloud private zones
    pub fn aliyun_pvtz() -> TtlRange {
        TtlRange::Discrete(vec![
            5, 10, 15, 20, 30, 60, 120, 300, 600, 1800, 3600, 43200, 86400,
        ])
    }

    pub fn discrete(mut allowed: Vec<i64>) -> TtlRange {
        allowed.sort_unstable();
        allowed.dedup();
        TtlRange::Discrete(allowed)
    }

    /// The TTL the product would actually store for `ttl`.
    ///
    /// Continuous ranges clamp. Discrete ranges snap to the nearest allowed
    /// value; a tie goes to the larger one.
    pub fn supported_ttl(&self, ttl: i64) -> i64 {
        match self {
            TtlRange::Continuous { min, max } => ttl.clamp(*min, *max),
            TtlRange::Discrete(allowed) => {
                let (Some(first), Some(last)) = (allowed.first(), allowed.last()) else {
                    return ttl;
                };
                if ttl <= *first {
                    return *first;
                }
                for pair in allowed.windows(2) {
                    let (lower, upper) = (pair[0], pair[1]);
                    if ttl == lower {
                        return lower;
                    }
                    if ttl > lower && ttl < upper {
                        return if ttl - lower < upper - ttl { lower } else { upper };
                    }
                }
                *last
            }
        }
    }
}

/// One DNS record set as the local model describes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecordSet {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub dns_name: String,
    pub dns_type: DnsType,
    pub dns_value: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub mx_priority: i64,

    #[serde(default)]
    pub policy_type: DnsPolicyType,
    #[serde(default)]
    pub policy_value: DnsPolicyValue,
    #[serde(default)]
    pub policy_options: Option<Value>,
}

fn default_enabled() -> bool {
    true
}

impl DnsRecordSet {
    pub fn new(dns_name: impl Into<String>, dns_type: DnsType, dns_value: impl Into<String>) -> Self {
        Self {
            id: None,
            external_id: None,
            enabled: true,
            dns_name: dns_name.into(),
            dns_type,
            dns_value: dns_value.into(),
            status: String::new(),
            ttl: 0,
            mx_priority: 0,
            policy_type: DnsPolicyType::Simple,
            policy_value: DnsPolicyValue::default(),
            policy_options: None,
        }
    }

    /// Snapshot a provider record through its getters.
    pub fn from_remote<R: RemoteDnsRecordSet + ?Sized>(remote: &R) -> Self {
        let global_id = remote.global_id();
        Self {
            id: None,
            external_id: (!global_id.is_empty()).then(|| global_id.to_string()),
            enabled: remote.enabled(),
            dns_name: remote.dns_name().to_string(),
            dns_type: remote.dns_type(),
            dns_value: remote.dns_value().to_string(),
            status: remote.status().to_string(),
            ttl: remote.ttl(),
            mx_priority: remote.mx_priority(),
            policy_type: remote.policy_type(),
            policy_value: remote.policy_value().clone(),
            policy_options: remote.policy_options().cloned(),
        }
    }

    /// Field-by-field equality used to tell `common` from `updated`.
    pub fn equals(&self, other: &DnsRecordSet) -> bool {
        self.dns_name.to_lowercase() == other.dns_name.to_lowercase()
            && self.dns_type == other.dns_type
            && self.dns_value == other.dns_value
            && self.policy_type == other.policy_type
            && self.policy_value == other.policy_value
            && self.ttl == other.ttl
            && self.enabled == other.enabled
            && (self.dns_type != DnsType::Mx || self.mx_priority == other.mx_priority)
            && policy_options_equal(self.policy_options.as_ref(), other.policy_options.as_ref())
    }
}

impl fmt::Display for DnsRecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.dns_type, self.dns_name, self.dns_value, self.policy_type, self.policy_value
        )
    }
}

impl Comparable for DnsRecordSet {
    fn canonical_key(&self) -> String {
        self.to_string()
    }
}

impl Identifiable for DnsRecordSet {
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

/// Read-only view of a record set reported by a provider
pub trait RemoteDnsRecordSet {
    fn global_id(&self) -> &str;
    fn dns_name(&self) -> &str;
    fn dns_type(&self) -> DnsType;
    fn dns_value(&self) -> &str;
    fn status(&self) -> &str;
    fn enabled(&self) -> bool;
    fn ttl(&self) -> i64;
    fn mx_priority(&self) -> i64;
    fn policy_type(&self) -> DnsPolicyType;
    fn policy_value(&self) -> &DnsPolicyValue;
    fn policy_options(&self) -> Option<&Value>;
}

impl RemoteDnsRecordSet for DnsRecordSet {
    fn global_id(&self) -> &str {
        self.external_id.as_deref().unwrap_or_default()
    }

    fn dns_name(&self) -> &str {
        &self.dns_name
    }

    fn dns_type(&self) -> DnsType {
        self.dns_type
    }

    fn dns_value(&self) -> &str {
        &self.dns_value
    }

    fn status(&self) -> &str {
        &self.status
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn ttl(&self) -> i64 {
        self.ttl
    }

    fn mx_priority(&self) -> i64 {
        self.mx_priority
    }

    fn policy_type(&self) -> DnsPolicyType {
        self.policy_type
    }

    fn policy_value(&self) -> &DnsPolicyValue {
        &self.policy_value
    }

    fn policy_options(&self) -> Option<&Value> {
        self.policy_options.as_ref()
    }
}

/// Compare policy options structurally. Missing and non-object options count
/// as an empty object.
pub fn policy_options_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    let empty = Value::Object(Map::new());
    let normalize = |v: Option<&Value>| match v {
        Some(v @ Value::Object(_)) => v.clone(),
        _ => empty.clone(),
    };
    normalize(a) == normalize(b)
}

/// Parse policy options from provider text. Malformed input yields `None`.
pub fn parse_policy_options(raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(other) => {
            tracing::warn!(options = %other, "DNS policy options are not an object, ignoring");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse DNS policy options, ignoring");
            None
        }
    }
}

/// Outcome of a DNS comparison
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsRecordSetDiff {
    pub common: Vec<DnsRecordSet>,
    pub added: Vec<DnsRecordSet>,
    pub removed: Vec<DnsRecordSet>,
    pub updated: Vec<DnsRecordSet>,
}

impl DnsRecordSetDiff {
    pub fn is_converged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

struct DnsMerge;

impl MergePolicy<DnsRecordSet> for DnsMerge {
    fn matched(&mut self, mut local: DnsRecordSet, remote: DnsRecordSet) -> Matched<DnsRecordSet> {
        let same = local.equals(&remote);
        local.external_id = remote.external_id;
        if same {
            Matched::Common(local)
        } else {
            Matched::Updated(local)
        }
    }
}

/// Diff local record sets against the records a provider reports.
///
/// Records match on their key (type, name, value, policy). Matched records
/// whose other fields differ are reported in `updated`. `common` and
/// `updated` carry the remote `external_id`.
pub fn compare_dns_record_sets<R: RemoteDnsRecordSet>(
    remote: &[R],
    local: Vec<DnsRecordSet>,
    debug: bool,
) -> DnsRecordSetDiff {
    let mut remote: Vec<DnsRecordSet> = remote.iter().map(DnsRecordSet::from_remote).collect();
    let mut local = local;
    remote.sort_by_cached_key(|r| r.canonical_key());
    local.sort_by_cached_key(|r| r.canonical_key());
    tracing::debug!(local = local.len(), remote = remote.len(), "comparing DNS record sets");

    let outcome = merge_sorted(local, remote, &mut DnsMerge, debug);
    DnsRecordSetDiff {
        common: outcome.common,
        added: outcome.added,
        removed: outcome.removed,
        updated: outcome.updated,
    }
}
