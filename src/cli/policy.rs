use anyhow::Result;
use clap::Args;
use tourguide_policy_center::PolicySource;

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};
use super::runtime::parse_pairs;

#[derive(Args, Clone, Debug)]
pub struct PolicyArgs {
    /// Output format for the policy document
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Override a leaf for this invocation (path=value), e.g. cache.capacity=5
    #[arg(long = "set")]
    pub overrides: Vec<String>,
}

pub fn cmd_policy(args: PolicyArgs, ctx: &CliContext) -> Result<()> {
    let policy = ctx.policy(parse_pairs(&args.overrides)?)?;
    let format = args.format.unwrap_or(ctx.output());
    if print_structured(format, &policy)? {
        return Ok(());
    }

    println!("Policy Revision: {}", policy.rev);
    println!();
    println!(
        "Pre-render → interval_ms={}, route_mismatch_ticks={}, element_missing_ticks={}",
        policy.pre_render.interval_ms,
        policy.pre_render.route_mismatch_ticks,
        policy.pre_render.element_missing_ticks
    );
    println!(
        "Post-render → interval_ms={}, missing_ticks={}",
        policy.post_render.interval_ms, policy.post_render.missing_ticks
    );
    println!(
        "Observer → position_poll_ms={}, debounce_ms={}",
        policy.observer.position_poll_ms, policy.observer.debounce_ms
    );
    println!(
        "Cache → ttl_ms={}, capacity={}",
        policy.cache.ttl_ms, policy.cache.capacity
    );
    println!(
        "Selector → max_suffixes={}, max_class_fragments={}",
        policy.selector.max_suffixes, policy.selector.max_class_fragments
    );

    let overridden: Vec<_> = policy
        .provenance
        .values()
        .filter(|entry| entry.source != PolicySource::Builtin)
        .collect();
    if !overridden.is_empty() {
        println!();
        println!("Overrides:");
        for entry in overridden {
            println!("  {} ({:?})", entry.path, entry.source);
        }
    }
    Ok(())
}
