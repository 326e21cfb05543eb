use anyhow::{Context, Result};
use clap::Args;
use route_matcher::{RouteMatcher, RouteParams};
use serde_json::json;

use super::context::CliContext;
use super::output::print_structured;
use super::runtime::parse_pairs;

#[derive(Args, Clone, Debug)]
pub struct MatchArgs {
    /// Route pattern, e.g. /orgs/{{orgId}}/settings
    #[arg(long)]
    pub pattern: String,

    /// Location to test
    #[arg(long)]
    pub url: String,

    /// Placeholder value (key=value); overrides configured values
    #[arg(short, long)]
    pub param: Vec<String>,
}

pub fn cmd_match(args: MatchArgs, ctx: &CliContext) -> Result<()> {
    let mut params: RouteParams = ctx.config().route_params();
    for (name, value) in parse_pairs(&args.param)? {
        params.insert(name, value);
    }
    let matcher = RouteMatcher::new(params);
    let matched = matcher
        .try_matches(&args.url, &args.pattern)
        .context("Failed to compare route")?;

    let payload = json!({
        "pattern": args.pattern,
        "url": args.url,
        "matched": matched,
    });
    if !print_structured(ctx.output(), &payload)? {
        println!(
            "{} {} {}",
            args.url,
            if matched { "matches" } else { "does not match" },
            args.pattern
        );
    }
    Ok(())
}
