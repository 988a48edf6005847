use cloudweave_cloud::{ActionType, Plan, SyncReport};
use colored::Colorize;

fn details(action: &cloudweave_cloud::Action) -> String {
    let mut pairs: Vec<_> = action
        .details
        .iter()
        .map(|(k, v)| match v.as_str() {
            Some(s) => format!("{}={}", k, s),
            None => format!("{}={}", k, v),
        })
        .collect();
    pairs.sort();
    pairs.join(" ")
}

/// Print a plan, one line per action.
pub fn print_plan(title: &str, plan: &Plan) {
    println!("{}", title.bold());

    if plan.actions.is_empty() {
        println!("  {}", "(nothing declared, nothing remote)".dimmed());
    }

    for action in &plan.actions {
        let line = format!("{} {}", action.description, details(action).dimmed());
        match action.action_type {
            ActionType::Create => println!("  {} {}", "+".green().bold(), line.green()),
            ActionType::Delete => println!("  {} {}", "-".red().bold(), line.red()),
            ActionType::Update => println!("  {} {}", "~".yellow().bold(), line.yellow()),
            ActionType::NoOp => println!("  {} {}", "=".dimmed(), line),
        }
    }

    println!();
    let summary = plan.summary();
    if plan.has_changes {
        println!("{} {}", "Plan:".bold(), summary);
    } else {
        println!("{} {}", "✓ In sync:".green().bold(), summary);
    }
}

pub fn print_report(report: &SyncReport) {
    print_plan(
        &format!(
            "{} {} on {}",
            report.kind, report.resource_id, report.provider
        ),
        &report.plan,
    );

    for failure in &report.result.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.action_id,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!(
        "{} {} applied, {} failed after {} attempt(s)",
        "Result:".bold(),
        report.result.succeeded.len(),
        report.result.failed.len(),
        report.attempts
    );
}
