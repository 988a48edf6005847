use super::resource_id;
use crate::output::print_plan;
use crate::snapshot;
use crate::{Resource, SnapshotArgs};
use anyhow::anyhow;
use cloudweave_cloud::{Plan, ProviderProfile, ProviderRegistry};
use cloudweave_rules::{
    AccessGroupRuleInfo, compare_access_group_rules, compare_dns_record_sets, compare_rules,
};
use serde::Serialize;

fn provider_profile<'a>(
    registry: &'a ProviderRegistry,
    args: &SnapshotArgs,
) -> anyhow::Result<Option<&'a ProviderProfile>> {
    match args.provider.as_deref() {
        Some(name) => Ok(Some(registry.profile(name)?)),
        None => Ok(None),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn handle(
    resource: Resource,
    args: &SnapshotArgs,
    registry: &ProviderRegistry,
    debug: bool,
) -> anyhow::Result<()> {
    let profile = provider_profile(registry, args)?;
    let id = resource_id(&args.remote);

    match resource {
        Resource::Secgroup => {
            let profile = profile
                .ok_or_else(|| anyhow!("--provider is required for security groups"))?;
            let sg = profile.security_group.as_ref().ok_or_else(|| {
                anyhow!("provider '{}' has no security-group profile", profile.name)
            })?;
            let local = snapshot::load_security_rules(&args.local)?;
            let remote = snapshot::load_security_rules(&args.remote)?;

            let diff = compare_rules(
                &sg.window,
                local,
                remote,
                &sg.default_in,
                &sg.default_out,
                args.only_allow || sg.only_allow_rules,
                debug,
            );
            if args.json {
                return print_json(&diff);
            }
            print_plan(
                &format!(
                    "security-group {} on {} (priority {}..{} {})",
                    id, profile.name, sg.window.min, sg.window.max, sg.window.order
                ),
                &Plan::from_secgroup_diff(&id, &diff),
            );
        }
        Resource::Dns => {
            let mut local = snapshot::load_record_sets(&args.local)?;
            if let Some(dns) = profile.and_then(|p| p.dns.as_ref()) {
                local = dns.fit(local);
            }
            let remote = snapshot::load_record_sets(&args.remote)?;

            let diff = compare_dns_record_sets(&remote, local, debug);
            if args.json {
                return print_json(&diff);
            }
            print_plan(&format!("dns-zone {}", id), &Plan::from_dns_diff(&id, &diff));
        }
        Resource::AccessGroup => {
            let remote = snapshot::load_access_group(&args.remote, profile)?;
            let local = AccessGroupRuleInfo {
                rules: snapshot::load_access_rules(&args.local)?,
                ..remote.clone()
            };

            let diff = compare_access_group_rules(local, remote, debug);
            if args.json {
                return print_json(&diff);
            }
            print_plan(
                &format!("access-group {}", id),
                &Plan::from_access_group_diff(&id, &diff),
            );
        }
    }

    Ok(())
}
