//! `rdpg-smoke` command-line runner

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rdpg_lifecycle::{
    CfCli, HttpProbe, LifecycleOrchestrator, SmokeConfig, CONFIG_PATH_ENV, NUM_INSERTIONS_ENV,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .env(CONFIG_PATH_ENV)
        .value_parser(value_parser!(PathBuf))
        .help("Path to the JSON config file");

    Command::new("rdpg-smoke")
        .version(rdpg_lifecycle::VERSION)
        .about("End-to-end lifecycle smoke tests for the RDPG database service")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("Log filter used when RUST_LOG is unset"),
        )
        .subcommand(
            Command::new("run")
                .about("Run the lifecycle suite against the configured platform")
                .arg(config_arg.clone())
                .arg(
                    Arg::new("num-insertions")
                        .long("num-insertions")
                        .env(NUM_INSERTIONS_ENV)
                        .help("Rows inserted per table"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducible identifiers and platform names"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Load and validate the config, then print it with secrets redacted")
                .arg(config_arg),
        )
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &ArgMatches) -> Result<SmokeConfig> {
    let path = args.get_one::<PathBuf>("config");
    let num_insertions = args
        .try_get_one::<String>("num-insertions")
        .ok()
        .flatten()
        .map(String::as_str);
    let mut config = SmokeConfig::load(path.map(PathBuf::as_path), num_insertions)
        .context("failed to load config")?;

    if let Some(seed) = args.try_get_one::<u64>("seed").ok().flatten() {
        config.seed = Some(*seed);
    }
    Ok(config)
}

async fn run(args: &ArgMatches) -> Result<bool> {
    let config = load_config(args)?;
    info!(
        "Running smoke suite for {} with plans {:?}",
        config.service_name, config.plan_names
    );

    let probe = HttpProbe::new(config.probe_timeout()).context("failed to build HTTP probe")?;
    let orchestrator = LifecycleOrchestrator::new(config, Arc::new(CfCli::new()), Arc::new(probe));
    info!("Test application: {}", orchestrator.app_name());

    let report = orchestrator.run().await;
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.generate_text());
    }
    Ok(report.passed())
}

fn check_config(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let level = matches
        .get_one::<String>("log-level")
        .map_or("info", String::as_str);
    init_tracing(level);

    match matches.subcommand() {
        Some(("run", args)) => {
            let passed = run(args).await?;
            std::process::exit(if passed { 0 } else { 1 });
        }
        Some(("check-config", args)) => check_config(args),
        _ => bail!("unknown subcommand"),
    }
}
