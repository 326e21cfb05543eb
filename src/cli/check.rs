use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;
use tokio::fs;
use tourguide::{check_tour, TourReport};
use tourguide_core_types::TourData;
use tracing::debug;

use super::context::CliContext;
use super::output::print_structured;

#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    /// Tour JSON file: a single tour, or an object keyed by tour id
    pub file: PathBuf,
}

pub async fn cmd_check(args: CheckArgs, ctx: &CliContext) -> Result<()> {
    let content = fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let tours = parse_tours(&content)
        .with_context(|| format!("Failed to parse {}", args.file.display()))?;

    let params = ctx.config().route_params();
    let reports: Vec<(String, TourReport)> = tours
        .into_iter()
        .map(|(id, data)| {
            let report = check_tour(&data, &params);
            (id, report)
        })
        .collect();
    let errors: usize = reports.iter().map(|(_, report)| report.errors()).sum();

    let structured: HashMap<&str, &TourReport> = reports
        .iter()
        .map(|(id, report)| (id.as_str(), report))
        .collect();
    if !print_structured(ctx.output(), &structured)? {
        for (id, report) in &reports {
            println!("{}: {} steps, {} errors", id, report.steps, report.errors());
            for finding in &report.findings {
                let level = if finding.is_error() { "error" } else { "warning" };
                println!("  {}: {}", level, finding);
            }
        }
    }

    if errors > 0 {
        bail!("{} error(s) in {}", errors, args.file.display());
    }
    Ok(())
}

/// Accepts either one `TourData` or the `{ id: TourData }` shape returned by
/// the flow endpoint. Ids are sorted for stable output.
fn parse_tours(content: &str) -> Result<Vec<(String, TourData)>> {
    let value: Value = serde_json::from_str(content)?;
    if value.get("templates").is_some() {
        debug!("checking a single tour");
        return Ok(vec![("tour".to_string(), serde_json::from_value(value)?)]);
    }
    let map: HashMap<String, TourData> = serde_json::from_value(value)?;
    let mut tours: Vec<(String, TourData)> = map.into_iter().collect();
    tours.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(tours)
}
