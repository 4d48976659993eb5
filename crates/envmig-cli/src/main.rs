//! envmig - provision, migrate and cut over content environments

mod report;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use envmig_contentful::ContentfulClient;
use envmig_core::{
    CommandExecutor, MigrateConfig, MigrationCatalog, Orchestrator, ReadinessPolicy, RunTarget,
};
use report::{annotation, render_plan, render_report, Plan};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "envmig=info";

fn cli() -> Command {
    Command::new("envmig")
        .version(envmig_core::VERSION)
        .about(
            "Provision a content environment, apply pending migrations and switch the primary \
             alias",
        )
        .arg(
            Arg::new("poll-interval-ms")
                .long("poll-interval-ms")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Delay between environment status checks"),
        )
        .arg(
            Arg::new("max-poll-attempts")
                .long("max-poll-attempts")
                .global(true)
                .value_parser(value_parser!(u32).range(1..))
                .help("Status checks before giving up on readiness"),
        )
        .arg(
            Arg::new("readiness-policy")
                .long("readiness-policy")
                .global(true)
                .value_parser(["fail", "proceed"])
                .help("What to do when the environment never reports ready"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help("Log level for envmig targets (overrides RUST_LOG)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print the report as JSON"),
        )
        .subcommand(Command::new("run").about("Run the full migration pipeline (default)"))
        .subcommand(
            Command::new("plan").about(
                "Show the target environment and migration catalogue without contacting the \
                 backend",
            ),
        )
}

fn init_tracing(args: &ArgMatches) -> Result<()> {
    let filter = match args.get_one::<String>("log-level") {
        Some(level) => EnvFilter::try_new(format!("envmig={level}"))
            .with_context(|| format!("invalid log level {level:?}"))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if args.get_one::<String>("log-format").map(String::as_str) == Some("json") {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Apply command-line overrides on top of the environment configuration
fn apply_overrides(mut config: MigrateConfig, args: &ArgMatches) -> Result<MigrateConfig> {
    if let Some(ms) = args.get_one::<u64>("poll-interval-ms") {
        config = config.with_poll_interval(Duration::from_millis(*ms));
    }
    if let Some(attempts) = args.get_one::<u32>("max-poll-attempts") {
        config = config.with_max_poll_attempts(*attempts)?;
    }
    if let Some(policy) = args.get_one::<String>("readiness-policy") {
        let policy = policy.parse::<ReadinessPolicy>().map_err(anyhow::Error::msg)?;
        config = config.with_readiness_policy(policy);
    }
    Ok(config)
}

async fn run(config: MigrateConfig, json: bool) -> Result<()> {
    let api = Arc::new(
        ContentfulClient::from_config(&config).context("creating management client")?,
    );
    let executor = Arc::new(CommandExecutor::from_config(&config));

    let report = Orchestrator::new(config, api, executor).run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

async fn plan(config: MigrateConfig, json: bool) -> Result<()> {
    let dir = config.migrations_dir();
    let catalog = MigrationCatalog::discover(&dir)
        .await
        .with_context(|| format!("reading migrations from {}", dir.display()))?;
    let target = RunTarget::resolve(&config.naming, config.branch(), chrono::Utc::now());
    let plan = Plan::new(&target, &catalog);

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render_plan(&plan));
    }
    Ok(())
}

async fn dispatch(command: &str, args: &ArgMatches) -> Result<()> {
    let config = MigrateConfig::from_env().context("loading configuration")?;
    let config = apply_overrides(config, args)?;
    tracing::debug!(?config, "Loaded configuration");

    let json = args.get_flag("json");
    match command {
        "plan" => plan(config, json).await,
        _ => run(config, json).await,
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let (command, args) = match matches.subcommand() {
        Some((name, args)) => (name, args),
        None => ("run", &matches),
    };

    if let Err(e) = init_tracing(args) {
        eprintln!("{e:#}");
        std::process::exit(2);
    }

    if let Err(e) = dispatch(command, args).await {
        tracing::error!("{:#}", e);
        println!("{}", annotation(&format!("{e:#}")));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envmig_test_utils::test_config;
    use std::path::Path;

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn global_flags_reach_subcommands() {
        let matches = cli()
            .try_get_matches_from(["envmig", "plan", "--json", "--max-poll-attempts", "3"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();

        assert_eq!(name, "plan");
        assert!(args.get_flag("json"));
        assert_eq!(args.get_one::<u32>("max-poll-attempts"), Some(&3));
    }

    #[test]
    fn zero_poll_attempts_are_rejected_by_the_parser() {
        assert!(cli()
            .try_get_matches_from(["envmig", "--max-poll-attempts", "0"])
            .is_err());
    }

    #[test]
    fn overrides_replace_environment_values() {
        let matches = cli()
            .try_get_matches_from([
                "envmig",
                "--poll-interval-ms",
                "250",
                "--max-poll-attempts",
                "4",
                "--readiness-policy",
                "proceed",
            ])
            .unwrap();

        let base = test_config(Path::new("/work"), "refs/heads/master");
        let config = apply_overrides(base, &matches).unwrap();

        assert_eq!(config.polling.interval, Duration::from_millis(250));
        assert_eq!(config.polling.max_attempts, 4);
        assert_eq!(config.polling.readiness_policy, ReadinessPolicy::Proceed);
    }

    #[test]
    fn absent_flags_keep_environment_values() {
        let matches = cli().try_get_matches_from(["envmig"]).unwrap();
        let base = test_config(Path::new("/work"), "refs/heads/master");

        let config = apply_overrides(base.clone(), &matches).unwrap();

        assert_eq!(config.polling, base.polling);
    }
}
