use clap::Subcommand;

use super::check::CheckArgs;
use super::policy::PolicyArgs;
use super::route::MatchArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Test a URL against a route pattern
    Match(MatchArgs),

    /// Validate a tour definition file
    Check(CheckArgs),

    /// Show the effective validation policy
    Policy(PolicyArgs),

    /// Show build and configuration information
    Info,
}
