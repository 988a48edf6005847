//! cloudweave rule reconciliation engine
//!
//! Compares locally desired rules against the state a cloud provider reports
//! and computes what has to be created, updated or deleted to converge them.
//!
//! Three resource kinds are covered:
//! - security-group rules ([`compare_rules`])
//! - NAS access-group rules ([`compare_access_group_rules`])
//! - DNS record sets ([`compare_dns_record_sets`])
//!
//! Every comparison is a pure function: no I/O, no shared state, no errors.
//! Only parsing rules from text can fail, with [`RuleError`].

pub mod access_group;
pub mod allowlist;
pub mod dns;
pub mod error;
pub mod merge;
pub mod order;
pub mod secgroup;
pub mod secrule;
pub mod traits;

pub use access_group::{
    AccessGroupRule, AccessGroupRuleDiff, AccessGroupRuleInfo, RwAccessType, UserAccessType,
    add_priority, compare_access_group_rules,
};
pub use dns::{
    DnsPolicyType, DnsPolicyValue, DnsRecordSet, DnsRecordSetDiff, DnsType, DnsZoneType,
    RemoteDnsRecordSet, TtlRange, compare_dns_record_sets, parse_policy_options,
};
pub use error::{Result, RuleError};
pub use merge::{Matched, MergeOutcome, MergePolicy, merge_sorted};
pub use order::{PriorityCursor, PriorityOrder, PriorityWindow, next_priority};
pub use secgroup::{SecurityRuleDiff, compare_rules, inject_default, local_default_rule};
pub use secrule::{
    DefaultSide, Direction, PortSpec, Protocol, RuleAction, RuleOrigin, SecurityRule,
};
pub use traits::{Comparable, Identifiable, Prioritized};
