//! routinectl: run hardware diagnostic plans
//!
//! ## Usage
//!
//! ```bash
//! routinectl routines                          # List known routines
//! routinectl validate plans/network.yaml       # Check a plan
//! routinectl run plans/network.yaml            # Run it
//! routinectl run plans/network.yaml -f json    # JSON report
//! ```

use clap::Parser;
use routine_runner::{RoutineType, RunPlan};
use routinectl::{
    Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, DiagnosticRunner, RunArgs,
    ValidateArgs, Verbosity,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    init_tracing(config.verbosity);

    match cli.command {
        Commands::Run(args) => run_plan(config, &args),
        Commands::Validate(args) => validate_plan(&args),
        Commands::Routines => {
            list_routines();
            Ok(())
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.into();

    CliConfig::new().with_verbosity(verbosity).with_color(color)
}

/// Logs go to stderr so JSON reports on stdout stay parseable
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_plan(config: CliConfig, args: &RunArgs) -> CliResult<()> {
    if args.cancel_after == Some(0) {
        return Err(CliError::invalid_argument("--cancel-after must be at least 1"));
    }
    let plan = RunPlan::load(&args.plan)?;
    let config = config
        .with_format(args.format.into())
        .with_cancel_after(args.cancel_after);
    let runner = DiagnosticRunner::new(config);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("Failed to create runtime: {e}")))?;
    let report = rt.block_on(runner.run_plan(&plan))?;
    runner.print(&report)?;

    if report.has_failures() {
        return Err(CliError::test_execution(format!(
            "{} of {} units failed",
            report.count(routine_runner::UnitStatus::Failed),
            report.units.len()
        )));
    }
    Ok(())
}

fn validate_plan(args: &ValidateArgs) -> CliResult<()> {
    let plan = RunPlan::load(&args.plan)?;
    println!(
        "Plan '{}' is valid ({} units, {} routines)",
        plan.name,
        plan.units.len(),
        plan.routine_count()
    );
    Ok(())
}

fn list_routines() {
    for routine in RoutineType::ALL {
        let id = serde_json::to_value(routine)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let category = if routine.is_power() { "power" } else { "standard" };
        println!("{id:<28} {category:<9} {routine}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_quiet_wins() {
        let cli = Cli::parse_from(["routinectl", "-q", "-vv", "routines"]);
        let config = build_config(&cli);
        assert!(config.verbosity.is_quiet());
    }

    #[test]
    fn test_build_config_color() {
        let cli = Cli::parse_from(["routinectl", "--color", "always", "routines"]);
        assert_eq!(build_config(&cli).color, ColorChoice::Always);
    }

    #[test]
    fn test_zero_cancel_after_rejected() {
        let args = RunArgs {
            plan: "missing.yaml".into(),
            format: routinectl::FormatArg::Text,
            cancel_after: Some(0),
        };
        let err = run_plan(CliConfig::new(), &args).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { .. }));
    }

    #[test]
    fn test_missing_plan_is_error() {
        let args = ValidateArgs {
            plan: "definitely/missing.yaml".into(),
        };
        assert!(validate_plan(&args).is_err());
    }
}
