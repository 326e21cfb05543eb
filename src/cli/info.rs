use anyhow::Result;

use super::context::CliContext;

pub fn cmd_info(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();

    println!("Tourguide");
    println!("=========");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Commit: {}", env!("GIT_HASH"));
    println!("Git Branch: {}", env!("GIT_BRANCH"));
    println!();

    println!("Configuration:");
    println!("- Config File: {}", ctx.config_path().display());
    println!(
        "- Flow Endpoint: {}",
        config.flow_endpoint.as_deref().unwrap_or("(not configured)")
    );
    println!("- Fetch Timeout: {}ms", config.fetch_timeout_ms);
    if config.policy_paths.is_empty() {
        println!("- Policy Paths: (builtin defaults)");
    } else {
        println!("- Policy Paths:");
        for path in &config.policy_paths {
            println!("  - {}", path.display());
        }
    }
    if !config.route_params.is_empty() {
        println!("- Route Params:");
        for (name, value) in &config.route_params {
            println!("  - {} = {}", name, value);
        }
    }
    Ok(())
}
