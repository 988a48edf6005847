//! Provider profile parsing
//!
//! ```kdl
//! provider "aliyun" {
//!     display-name "Alibaba Cloud"
//!     security-group min=1 max=100 order="ascending" {
//!         only-allow-rules #false
//!         default-in "in:deny any"
//!         default-out "out:allow any"
//!     }
//!     access-group min=1 max=100 {
//!         user-access-types "no_root_squash" "root_squash"
//!     }
//!     dns {
//!         ttl-range min=600 max=86400
//!         policy-types "simple" "weighted"
//!     }
//! }
//! ```
//!
//! A provider that already has a profile (a built-in preset) only changes
//! what its node mentions.

use crate::error::{ConfigError, Result};
use cloudweave_cloud::{
    AccessGroupProfile, DnsProfile, ProviderProfile, ProviderRegistry, SecurityGroupProfile,
};
use cloudweave_rules::{
    DnsPolicyType, PriorityOrder, PriorityWindow, SecurityRule, TtlRange, UserAccessType,
};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::Path;

fn invalid(provider: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidProfile {
        provider: provider.to_string(),
        message: message.into(),
    }
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

fn arguments(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

fn property<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(key))
        .map(|e| e.value())
}

fn int_property<T: TryFrom<i128>>(provider: &str, node: &KdlNode, key: &str) -> Result<Option<T>> {
    match property(node, key) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|v| T::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| {
                invalid(
                    provider,
                    format!("{} {}= must be an integer in range", node.name().value(), key),
                )
            }),
    }
}

fn string_argument<'a>(provider: &str, node: &'a KdlNode) -> Result<&'a str> {
    first_string(node)
        .ok_or_else(|| invalid(provider, format!("{} requires a string", node.name().value())))
}

/// Parse every `provider` node of a document.
///
/// `base` supplies the profile a node refines, usually the built-in preset
/// of the same name.
pub fn parse_profiles(
    content: &str,
    base: impl Fn(&str) -> Option<ProviderProfile>,
) -> Result<Vec<ProviderProfile>> {
    let doc: KdlDocument = content.parse()?;
    let mut profiles = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "provider" => profiles.push(parse_provider(node, &base)?),
            other => tracing::warn!("Ignoring unknown top-level node: {}", other),
        }
    }

    Ok(profiles)
}

fn parse_provider(
    node: &KdlNode,
    base: &impl Fn(&str) -> Option<ProviderProfile>,
) -> Result<ProviderProfile> {
    let name = first_string(node)
        .ok_or_else(|| invalid("?", "provider requires a name"))?
        .to_string();

    let mut profile = base(&name).unwrap_or_else(|| ProviderProfile::new(&name, &name));

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "display-name" | "display_name" => {
                    profile.display_name = string_argument(&name, child)?.to_string();
                }
                "security-group" | "security_group" => {
                    let parsed = parse_security_group(&name, child, profile.security_group.take())?;
                    profile.security_group = Some(parsed);
                }
                "access-group" | "access_group" => {
                    let parsed = parse_access_group(&name, child, profile.access_group.take())?;
                    profile.access_group = Some(parsed);
                }
                "dns" => {
                    profile.dns = Some(parse_dns(&name, child, profile.dns.take())?);
                }
                other => tracing::warn!("{}: ignoring unknown node '{}'", name, other),
            }
        }
    }

    Ok(profile)
}

fn parse_security_group(
    provider: &str,
    node: &KdlNode,
    base: Option<SecurityGroupProfile>,
) -> Result<SecurityGroupProfile> {
    let min = int_property::<i32>(provider, node, "min")?;
    let max = int_property::<i32>(provider, node, "max")?;
    let order = match property(node, "order") {
        Some(value) => Some(
            value
                .as_string()
                .ok_or_else(|| invalid(provider, "order= must be a string"))?
                .parse::<PriorityOrder>()?,
        ),
        None => None,
    };

    let mut profile = match base {
        Some(mut profile) => {
            profile.window = PriorityWindow::new(
                min.unwrap_or(profile.window.min),
                max.unwrap_or(profile.window.max),
                order.unwrap_or(profile.window.order),
            );
            profile
        }
        None => {
            let (min, max) = min
                .zip(max)
                .ok_or_else(|| invalid(provider, "security-group requires min= and max="))?;
            SecurityGroupProfile::new(min, max, order.unwrap_or_default())?
        }
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "only-allow-rules" | "only_allow_rules" => {
                    profile.only_allow_rules = arguments(child)
                        .next()
                        .map_or(Some(true), |v| v.as_bool())
                        .ok_or_else(|| invalid(provider, "only-allow-rules takes #true or #false"))?;
                }
                "default-in" | "default_in" => {
                    profile.default_in = SecurityRule::parse(string_argument(provider, child)?)?;
                }
                "default-out" | "default_out" => {
                    profile.default_out = SecurityRule::parse(string_argument(provider, child)?)?;
                }
                other => tracing::warn!("{}: ignoring unknown security-group node '{}'", provider, other),
            }
        }
    }

    Ok(profile)
}

fn parse_access_group(
    provider: &str,
    node: &KdlNode,
    base: Option<AccessGroupProfile>,
) -> Result<AccessGroupProfile> {
    let min = int_property::<i32>(provider, node, "min")?;
    let max = int_property::<i32>(provider, node, "max")?;

    let mut profile = match base {
        Some(mut profile) => {
            profile.min_priority = min.unwrap_or(profile.min_priority);
            profile.max_priority = max.unwrap_or(profile.max_priority);
            profile
        }
        None => {
            let (min_priority, max_priority) = min
                .zip(max)
                .ok_or_else(|| invalid(provider, "access-group requires min= and max="))?;
            AccessGroupProfile {
                min_priority,
                max_priority,
                supported_user_access_types: UserAccessType::ALL.to_vec(),
            }
        }
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "user-access-types" | "user_access_types" => {
                    profile.supported_user_access_types = arguments(child)
                        .map(|v| {
                            v.as_string()
                                .ok_or_else(|| invalid(provider, "user-access-types takes strings"))
                                .and_then(|s| s.parse::<UserAccessType>().map_err(ConfigError::from))
                        })
                        .collect::<Result<_>>()?;
                }
                other => tracing::warn!("{}: ignoring unknown access-group node '{}'", provider, other),
            }
        }
    }

    Ok(profile)
}

fn parse_dns(provider: &str, node: &KdlNode, base: Option<DnsProfile>) -> Result<DnsProfile> {
    let mut ttl_range = base.as_ref().map(|p| p.ttl_range.clone());
    let mut policy_types = base
        .map(|p| p.policy_types)
        .unwrap_or_else(|| vec![DnsPolicyType::Simple]);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "ttl-range" | "ttl_range" => {
                    ttl_range = Some(parse_ttl_range(provider, child)?);
                }
                "policy-types" | "policy_types" => {
                    policy_types = arguments(child)
                        .map(|v| {
                            v.as_string()
                                .ok_or_else(|| invalid(provider, "policy-types takes strings"))
                                .and_then(|s| s.parse::<DnsPolicyType>().map_err(ConfigError::from))
                        })
                        .collect::<Result<_>>()?;
                }
                other => tracing::warn!("{}: ignoring unknown dns node '{}'", provider, other),
            }
        }
    }

    Ok(DnsProfile {
        ttl_range: ttl_range.ok_or_else(|| invalid(provider, "dns requires ttl-range"))?,
        policy_types,
    })
}

/// `ttl-range min=600 max=86400` or `ttl-range 5 10 30 60`
fn parse_ttl_range(provider: &str, node: &KdlNode) -> Result<TtlRange> {
    let min = int_property::<i64>(provider, node, "min")?;
    let max = int_property::<i64>(provider, node, "max")?;
    if let Some((min, max)) = min.zip(max) {
        if min > max {
            return Err(invalid(provider, format!("ttl-range min {} exceeds max {}", min, max)));
        }
        return Ok(TtlRange::Continuous { min, max });
    }

    let allowed = arguments(node)
        .map(|v| {
            v.as_integer()
                .and_then(|v| i64::try_from(v).ok())
                .ok_or_else(|| invalid(provider, "ttl-range values must be integers"))
        })
        .collect::<Result<Vec<_>>>()?;
    if allowed.is_empty() {
        return Err(invalid(provider, "ttl-range needs min=/max= or a list of values"));
    }
    Ok(TtlRange::discrete(allowed))
}

/// Read and parse a profile file, refining the profiles `registry` knows.
#[tracing::instrument(skip(registry))]
pub fn load_profiles(path: &Path, registry: &ProviderRegistry) -> Result<Vec<ProviderProfile>> {
    let content = std::fs::read_to_string(path)?;
    let profiles = parse_profiles(&content, |name| registry.profile(name).ok().cloned())?;
    tracing::debug!("Loaded {} provider profiles from {}", profiles.len(), path.display());
    Ok(profiles)
}

/// Load `path` and install its profiles into `registry`.
pub fn apply_profiles(path: &Path, registry: &mut ProviderRegistry) -> Result<usize> {
    let profiles = load_profiles(path, registry)?;
    let count = profiles.len();
    for profile in profiles {
        registry.override_profile(profile);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn no_base(_: &str) -> Option<ProviderProfile> {
        None
    }

    #[test]
    fn test_parse_full_profile() {
        let kdl = r#"
provider "lab" {
    display-name "Lab Cloud"
    security-group min=10 max=200 order="descending" {
        only-allow-rules #true
        default-in "in:allow any"
    }
    access-group min=1 max=50 {
        user-access-types "root_squash" "no_root_squash"
    }
    dns {
        ttl-range min=60 max=3600
        policy-types "simple" "weighted"
    }
}
"#;
        let profiles = parse_profiles(kdl, no_base).unwrap();
        assert_eq!(profiles.len(), 1);
        let lab = &profiles[0];
        assert_eq!(lab.name, "lab");
        assert_eq!(lab.display_name, "Lab Cloud");

        let sg = lab.security_group.as_ref().unwrap();
        assert_eq!((sg.window.min, sg.window.max), (10, 200));
        assert_eq!(sg.window.order, PriorityOrder::Descending);
        assert!(sg.only_allow_rules);
        assert_eq!(sg.default_in.to_string(), "in:allow any");
        assert_eq!(sg.default_out.to_string(), "out:allow any");

        let ag = lab.access_group.as_ref().unwrap();
        assert_eq!(ag.max_priority, 50);
        assert_eq!(
            ag.supported_user_access_types,
            vec![UserAccessType::RootSquash, UserAccessType::NoRootSquash]
        );

        let dns = lab.dns.as_ref().unwrap();
        assert_eq!(dns.ttl_range, TtlRange::Continuous { min: 60, max: 3600 });
        assert_eq!(dns.policy_types, vec![DnsPolicyType::Simple, DnsPolicyType::Weighted]);
    }

    #[test]
    fn test_discrete_ttl_range() {
        let kdl = r#"
provider "pvtz" {
    dns {
        ttl-range 600 5 60 60
    }
}
"#;
        let profiles = parse_profiles(kdl, no_base).unwrap();
        let dns = profiles[0].dns.as_ref().unwrap();
        assert_eq!(dns.ttl_range, TtlRange::Discrete(vec![5, 60, 600]));
        assert_eq!(dns.policy_types, vec![DnsPolicyType::Simple]);
    }

    #[test]
    fn test_refines_base_profile() {
        let registry = ProviderRegistry::with_builtin_profiles().unwrap();
        let kdl = r#"
provider "azure" {
    security-group max=2000
}
"#;
        let profiles = parse_profiles(kdl, |name| registry.profile(name).ok().cloned()).unwrap();
        let azure = &profiles[0];
        assert_eq!(azure.display_name, "Microsoft Azure");
        let sg = azure.security_group.as_ref().unwrap();
        assert_eq!((sg.window.min, sg.window.max), (100, 2000));
    }

    #[test]
    fn test_invalid_profiles() {
        let cases = [
            (r#"provider { }"#, "requires a name"),
            (r#"provider "x" { security-group min=1 }"#, "requires min= and max="),
            (r#"provider "x" { security-group min="a" max=2 }"#, "must be an integer"),
            (r#"provider "x" { dns { } }"#, "requires ttl-range"),
            (r#"provider "x" { dns { ttl-range min=10 max=1 } }"#, "exceeds max"),
        ];
        for (kdl, expected) in cases {
            let err = parse_profiles(kdl, no_base).unwrap_err();
            assert!(err.to_string().contains(expected), "{kdl}: {err}");
        }

        let err = parse_profiles(
            r#"provider "x" { security-group min=1 max=2 { default-in "sideways:allow" } }"#,
            no_base,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Rule(_)));

        let err = parse_profiles(
            r#"provider "x" { access-group min=1 max=2 { user-access-types "squash_all" } }"#,
            no_base,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Rule(_)));

        assert!(matches!(
            parse_profiles("provider \"x\" {", no_base),
            Err(ConfigError::KdlParse(_))
        ));
    }

    #[test]
    fn test_apply_profiles_overrides_registry() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("weave.kdl");
        fs::write(
            &path,
            r#"
provider "aws" {
    security-group {
        only-allow-rules #false
    }
}
provider "lab" {
    display-name "Lab"
}
"#,
        )
        .unwrap();

        let mut registry = ProviderRegistry::with_builtin_profiles().unwrap();
        assert_eq!(apply_profiles(&path, &mut registry).unwrap(), 2);

        let aws = registry.profile("aws").unwrap();
        assert!(!aws.security_group.as_ref().unwrap().only_allow_rules);
        assert!(aws.dns.is_some());
        assert_eq!(registry.profile("lab").unwrap().display_name, "Lab");
    }
}
