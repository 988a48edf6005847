use super::resource_id;
use crate::output::print_report;
use crate::snapshot;
use crate::{Resource, SnapshotArgs};
use anyhow::anyhow;
use cloudweave_cloud::{MemoryProvider, ProviderRegistry, Reconciler, RetryConfig};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

/// Seed an in-memory provider with the remote snapshot, reconcile it
/// against the local one and optionally save the converged state.
pub async fn handle(
    resource: Resource,
    args: &SnapshotArgs,
    write: Option<&Path>,
    mut registry: ProviderRegistry,
    debug: bool,
) -> anyhow::Result<()> {
    let provider = args
        .provider
        .clone()
        .ok_or_else(|| anyhow!("--provider is required for reconcile"))?;
    let mut profile = registry.profile(&provider)?.clone();
    if let Some(sg) = profile.security_group.as_mut().filter(|_| args.only_allow) {
        sg.only_allow_rules = true;
    }

    let id = resource_id(&args.remote);
    let cloud = Arc::new(MemoryProvider::new(profile.clone()));
    registry.override_profile(profile.clone());
    registry.register(cloud.clone());
    let reconciler = Reconciler::new(Arc::new(registry))
        .with_retry(RetryConfig::none())
        .with_holder("weave")
        .with_debug(debug);

    let report = match resource {
        Resource::Secgroup => {
            cloud
                .set_security_group(&id, snapshot::load_security_rules(&args.remote)?)
                .await;
            let local = snapshot::load_security_rules(&args.local)?;
            reconciler.sync_security_group(&provider, &id, local).await?
        }
        Resource::Dns => {
            cloud
                .set_zone(&id, snapshot::load_record_sets(&args.remote)?)
                .await;
            let local = snapshot::load_record_sets(&args.local)?;
            reconciler.sync_dns_zone(&provider, &id, local).await?
        }
        Resource::AccessGroup => {
            cloud
                .set_access_group(&id, snapshot::load_access_group(&args.remote, Some(&profile))?)
                .await;
            let local = snapshot::load_access_rules(&args.local)?;
            reconciler.sync_access_group(&provider, &id, local).await?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if let Some(path) = write {
        match resource {
            Resource::Secgroup => snapshot::save(path, &cloud.security_group(&id).await)?,
            Resource::Dns => snapshot::save(path, &cloud.zone(&id).await)?,
            Resource::AccessGroup => snapshot::save(path, &cloud.access_group(&id).await)?,
        }
        if !args.json {
            println!("Converged state written to {}", path.display().to_string().cyan());
        }
    }

    Ok(())
}
