use cloudweave_cloud::ProviderRegistry;
use cloudweave_rules::TtlRange;
use colored::Colorize;

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn handle(registry: &ProviderRegistry, json: bool) -> anyhow::Result<()> {
    if json {
        let profiles: Vec<_> = registry.profiles().collect();
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    for profile in registry.profiles() {
        println!("{} ({})", profile.name.cyan().bold(), profile.display_name);

        if let Some(sg) = &profile.security_group {
            let mode = if sg.only_allow_rules { ", allow rules only" } else { "" };
            println!(
                "  security-group: priority {}..{} {}{}",
                sg.window.min, sg.window.max, sg.window.order, mode
            );
            println!(
                "                  defaults {} / {}",
                sg.default_in, sg.default_out
            );
        }

        if let Some(ag) = &profile.access_group {
            println!(
                "  access-group:   priority {}..{}, {}",
                ag.min_priority,
                ag.max_priority,
                join(&ag.supported_user_access_types)
            );
        }

        if let Some(dns) = &profile.dns {
            let ttl = match &dns.ttl_range {
                TtlRange::Continuous { min, max } => format!("{}..{}", min, max),
                TtlRange::Discrete(allowed) => join(allowed),
            };
            println!("  dns:            ttl {}, policies {}", ttl, join(&dns.policy_types));
        }
    }

    Ok(())
}
