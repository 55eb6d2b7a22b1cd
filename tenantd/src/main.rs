mod config;

use clap::{Parser, Subcommand};
use config::{Config, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tenancy::{DataCategory, Initializer, Tenancy};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "tenantd", about = "Multi-tenant context propagation and database routing")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, default_value = "tenantd.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Bootstrap and serve the tenant and admin listeners
    Serve,
    /// Validate the configuration and run the bootstrap sequence
    Check,
    /// List registered tenants and their connection aliases
    Tenants,
    /// Show which aliases may receive migrations for a data category
    MigratePlan {
        #[arg(long, default_value = "tenant")]
        category: DataCategory,
    },
}

/// Logs every fanned-out schedule once bootstrap reaches it.
struct ScheduleLogger;

impl Initializer for ScheduleLogger {
    fn name(&self) -> &'static str {
        "schedule_logger"
    }

    fn run(&mut self, tenancy: &Tenancy) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for schedule in tenancy.schedules() {
            tracing::info!(
                name = %schedule.name,
                task = %schedule.task,
                every = ?schedule.every,
                tenant = schedule.tenant.as_deref().unwrap_or("-"),
                "schedule registered"
            );
        }
        Ok(())
    }
}

fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let default_level = logging
        .and_then(|logging| logging.level.as_deref())
        .unwrap_or("info");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let guard = logging
        .and_then(|logging| logging.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), String> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(&config.prefix))
        .map_err(|err| err.to_string())?;
    metrics::set_global_recorder(recorder).map_err(|err| err.to_string())?;

    shared::metrics_defs::describe_all(tenancy::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(gateway::metrics_defs::ALL_METRICS);
    Ok(())
}

fn exit_with(message: &str, err: &dyn std::fmt::Display) -> ! {
    tracing::error!(error = %err, "{message}");
    eprintln!("{message}: {err}");
    process::exit(1);
}

fn print_tenants(tenancy: &Tenancy) {
    for descriptor in tenancy.registry().descriptors() {
        println!("{}", descriptor.id());
        println!("  primary:   {}", descriptor.primary_alias());
        for replica in tenancy.get_replica_aliases(descriptor.id()) {
            println!("  replica:   {replica}");
        }
        for hostname in descriptor.alt_hostnames() {
            println!("  hostname:  {hostname}");
        }
    }
}

fn print_migration_plan(tenancy: &Tenancy, category: DataCategory) {
    println!("migration plan for {} data", category.as_str());
    for target in tenancy.migration_plan(category) {
        let verdict = if target.allowed { "migrate" } else { "skip" };
        let owner = target.tenant.as_deref().unwrap_or("-");
        println!("  {:<8} {:<24} {owner}", verdict, target.alias);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}: {err}", cli.config.display());
            process::exit(1);
        }
    };

    let _sentry = init_logging(config.common.logging.as_ref());

    if let Some(metrics) = &config.common.metrics
        && let Err(err) = init_metrics(metrics)
    {
        exit_with("failed to install statsd recorder", &err);
    }

    if let Err(err) = config.validate() {
        exit_with("invalid configuration", &err);
    }

    let initializers: Vec<Box<dyn Initializer>> = vec![Box::new(ScheduleLogger)];
    let tenancy = match Tenancy::bootstrap(&config.tenancy, initializers) {
        Ok(tenancy) => Arc::new(tenancy),
        Err(err) => exit_with("bootstrap failed", &err),
    };

    match cli.command {
        CliCommand::Serve => {
            let Some(gateway_config) = config.gateway else {
                exit_with("cannot serve", &"no `gateway` section in configuration");
            };
            if let Err(err) = gateway::run(gateway_config, tenancy).await {
                exit_with("gateway error", &err);
            }
        }
        CliCommand::Check => {
            println!(
                "ok: {} tenants, {} connections, {} schedules",
                tenancy.list_tenant_ids().len(),
                tenancy.registrar().aliases().count(),
                tenancy.schedules().len()
            );
        }
        CliCommand::Tenants => print_tenants(&tenancy),
        CliCommand::MigratePlan { category } => print_migration_plan(&tenancy, category),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::collections::HashSet;

    #[test]
    fn cli_definition() {
        Cli::command().debug_assert();

        let cli = Cli::parse_from([
            "tenantd",
            "-c",
            "/etc/tenantd.yaml",
            "migrate-plan",
            "--category",
            "infra",
        ]);
        assert_eq!(cli.config, PathBuf::from("/etc/tenantd.yaml"));
        assert!(matches!(
            cli.command,
            CliCommand::MigratePlan {
                category: DataCategory::Infra
            }
        ));

        assert!(Cli::try_parse_from(["tenantd", "migrate-plan", "--category", "shared"]).is_err());
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = HashSet::new();
        for def in tenancy::metrics_defs::ALL_METRICS
            .iter()
            .chain(gateway::metrics_defs::ALL_METRICS)
        {
            assert!(names.insert(def.name), "duplicate metric {}", def.name);
        }
    }
}
