//! Snapshot files
//!
//! Rules and records are read from and written to JSON or YAML, chosen by
//! file extension.

use anyhow::{Context, bail};
use cloudweave_cloud::ProviderProfile;
use cloudweave_rules::{
    AccessGroupRule, AccessGroupRuleInfo, DnsRecordSet, Result as RuleResult, SecurityRule,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

enum Format {
    Json,
    Yaml,
}

fn format_of(path: &Path) -> anyhow::Result<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("yaml") | Some("yml") => Ok(Format::Yaml),
        _ => bail!(
            "{}: unsupported snapshot format (use .json, .yaml or .yml)",
            path.display()
        ),
    }
}

pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let format = format_of(path)?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = match format {
        Format::Json => serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
        Format::Yaml => serde_yaml::from_str(&content)
            .with_context(|| format!("invalid YAML in {}", path.display()))?,
    };
    Ok(value)
}

pub fn save<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let content = match format_of(path)? {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Yaml => serde_yaml::to_string(value)?,
    };
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Security rule as written in a snapshot
///
/// ```yaml
/// - in:allow tcp 22
/// - rule: in:allow 10.0.0.0/8 tcp 443
///   priority: 10
///   external_id: sg-rule-1
/// - { direction: out, action: deny, protocol: udp, ports: "53" }
/// ```
#[derive(Deserialize)]
#[serde(untagged)]
enum RuleEntry {
    Text(String),
    Annotated {
        rule: String,
        #[serde(default)]
        priority: i32,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        external_id: Option<String>,
    },
    Full(SecurityRule),
}

impl RuleEntry {
    fn into_rule(self) -> RuleResult<SecurityRule> {
        match self {
            RuleEntry::Text(text) => SecurityRule::parse(&text),
            RuleEntry::Annotated {
                rule,
                priority,
                id,
                external_id,
            } => {
                let mut parsed = SecurityRule::parse(&rule)?.with_priority(priority);
                parsed.id = id;
                parsed.external_id = external_id;
                Ok(parsed)
            }
            RuleEntry::Full(rule) => {
                let rule = rule.normalized();
                rule.validate()?;
                Ok(rule)
            }
        }
    }
}

pub fn load_security_rules(path: &Path) -> anyhow::Result<Vec<SecurityRule>> {
    let entries: Vec<RuleEntry> = load(path)?;
    entries
        .into_iter()
        .map(|e| e.into_rule())
        .collect::<RuleResult<Vec<_>>>()
        .with_context(|| format!("invalid rule in {}", path.display()))
}

pub fn load_record_sets(path: &Path) -> anyhow::Result<Vec<DnsRecordSet>> {
    load(path)
}

/// Access-group snapshot: full info with bounds, or a bare rule list
#[derive(Deserialize)]
#[serde(untagged)]
enum AccessSnapshot {
    Info(AccessGroupRuleInfo),
    Rules(Vec<AccessGroupRule>),
}

/// Rules of an access-group snapshot of either shape
pub fn load_access_rules(path: &Path) -> anyhow::Result<Vec<AccessGroupRule>> {
    Ok(match load::<AccessSnapshot>(path)? {
        AccessSnapshot::Info(info) => info.rules,
        AccessSnapshot::Rules(rules) => rules,
    })
}

/// Load an access-group snapshot, taking missing bounds from the profile.
pub fn load_access_group(
    path: &Path,
    profile: Option<&ProviderProfile>,
) -> anyhow::Result<AccessGroupRuleInfo> {
    let bounds = profile.and_then(|p| p.access_group.as_ref());
    match load::<AccessSnapshot>(path)? {
        AccessSnapshot::Info(mut info) => {
            // the provider profile caps what the snapshot claims
            if let Some(bounds) = bounds {
                info.supported_user_access_types
                    .retain(|t| bounds.supported_user_access_types.contains(t));
            }
            Ok(info)
        }
        AccessSnapshot::Rules(rules) => {
            let Some(bounds) = bounds else {
                bail!(
                    "{}: a bare rule list needs --provider with an access-group profile",
                    path.display()
                );
            };
            Ok(AccessGroupRuleInfo {
                min_priority: bounds.min_priority,
                max_priority: bounds.max_priority,
                supported_user_access_types: bounds.supported_user_access_types.clone(),
                rules,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_rule_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "rules.yaml",
            r#"
- in:allow tcp 22
- rule: in:allow 10.0.0.0/8 tcp 443
  priority: 10
  external_id: r-1
- direction: out
  action: deny
  protocol: udp
  ports: "53"
"#,
        );
        let rules = load_security_rules(&path).unwrap();
        let keys: Vec<_> = rules.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            keys,
            vec!["in:allow tcp 22", "in:allow 10.0.0.0/8 tcp 443", "out:deny udp 53"]
        );
        assert_eq!(rules[1].priority, 10);
        assert_eq!(rules[1].external_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn test_bad_rule_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "rules.json", r#"["in:allow tcp 99999"]"#);
        let err = load_security_rules(&path).unwrap_err();
        assert!(format!("{err:#}").contains("rules.json"));
    }

    #[test]
    fn test_full_entry_ports_checked_against_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "rules.yaml",
            "- { direction: in, action: allow, protocol: icmp, ports: \"22\" }\n",
        );
        let err = load_security_rules(&path).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("rules.yaml"));
        assert!(message.contains("ports are only valid with tcp or udp"));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "rules.toml", "");
        assert!(load_security_rules(&path).is_err());
    }

    #[test]
    fn test_access_group_rule_list_needs_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "nas.json",
            r#"[{"rw_access_type": "RW", "user_access_type": "no_root_squash", "source": "10.0.0.0/8"}]"#,
        );
        assert!(load_access_group(&path, None).is_err());

        let registry = cloudweave_cloud::ProviderRegistry::with_builtin_profiles().unwrap();
        let info = load_access_group(&path, registry.profile("huawei").ok()).unwrap();
        assert_eq!((info.min_priority, info.max_priority), (1, 400));
        assert_eq!(info.rules.len(), 1);
    }

    #[test]
    fn test_access_group_info_capped_by_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "nas.json",
            r#"{"min_priority": 1, "max_priority": 100,
                "supported_user_access_types": ["all_squash", "root_squash", "no_root_squash"]}"#,
        );
        let info = load_access_group(&path, None).unwrap();
        assert_eq!(info.supported_user_access_types.len(), 3);

        let registry = cloudweave_cloud::ProviderRegistry::with_builtin_profiles().unwrap();
        let info = load_access_group(&path, registry.profile("huawei").ok()).unwrap();
        assert!(
            !info
                .supported_user_access_types
                .contains(&cloudweave_rules::UserAccessType::AllSquash)
        );
        assert_eq!((info.min_priority, info.max_priority), (1, 100));
    }
}
