use anyhow::Result;

use super::check::cmd_check;
use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::info::cmd_info;
use super::policy::cmd_policy;
use super::route::cmd_match;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Match(args) => cmd_match(args, ctx),
        Commands::Check(args) => cmd_check(args, ctx).await,
        Commands::Policy(args) => cmd_policy(args, ctx),
        Commands::Info => cmd_info(ctx),
    }
}
