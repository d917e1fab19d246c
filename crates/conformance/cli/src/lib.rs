//! Gateway conformance CLI
//!
//! Runs the built-in conformance catalog against a cluster and writes the
//! conformance report:
//! - resolves supported features and requested profiles from flags, env and
//!   an optional TOML config file (flags win over file values)
//! - prepares base namespaces, runs the suite, tears fixtures down
//! - logs the YAML report and optionally writes it to a file
//!
//! Exit codes: 0 completed, 1 configuration error, 2 cluster setup error,
//! 3 aborted mid-run, 4 report output error, 130 cancelled.

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conformance_suite::{
    builtin_catalog, cancellation, parse_list, parse_namespace_labels, ClusterClient,
    ConformanceOptions, MemoryCluster, Orchestrator,
};
use conformance_types::Channel;

mod config;
mod error;
mod output;

pub use error::{CliError, CliResult};

/// Gateway conformance CLI
#[derive(Parser, Debug)]
#[command(name = "gateway-conformance")]
#[command(
    about = "Run Gateway API conformance tests and produce a conformance report",
    long_about = None
)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "CONFORMANCE_CONFIG")]
    config: Option<PathBuf>,

    /// GatewayClass under test
    #[arg(long, env = "GATEWAY_CLASS")]
    gateway_class: Option<String>,

    /// Comma-separated features the implementation supports
    #[arg(long)]
    supported_features: Option<String>,

    /// Comma-separated features to exclude even if otherwise supported
    #[arg(long)]
    exempt_features: Option<String>,

    /// Treat every known feature as supported
    #[arg(long)]
    all_features: bool,

    /// Highest release channel considered by --all-features (standard, experimental)
    #[arg(long)]
    channel: Option<Channel>,

    /// Comma-separated test names to skip
    #[arg(long)]
    skip_tests: Option<String>,

    /// Labels for created namespaces, as key=value,key2=value2
    #[arg(long)]
    namespace_labels: Option<String>,

    /// Comma-separated conformance profiles to evaluate (HTTP, TLS, MESH)
    #[arg(long)]
    conformance_profiles: Option<String>,

    /// Implementation organization
    #[arg(long)]
    organization: Option<String>,

    /// Implementation project
    #[arg(long)]
    project: Option<String>,

    /// Implementation URL
    #[arg(long)]
    url: Option<String>,

    /// Implementation version
    #[arg(long)]
    version: Option<String>,

    /// Comma-separated implementation contacts
    #[arg(long)]
    contact: Option<String>,

    /// Tear down base and per-test resources after the run
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    cleanup_base_resources: Option<bool>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Write the report to this file
    #[arg(long)]
    report_output: Option<PathBuf>,

    /// Per-test timeout in seconds
    #[arg(long)]
    test_timeout: Option<u64>,

    /// Extra attempts for failed tests
    #[arg(long)]
    retries: Option<u32>,

    /// Concurrent shared-scope tests
    #[arg(long)]
    parallelism: Option<usize>,

    /// Run against an in-memory cluster
    #[arg(long)]
    simulate: bool,
}

impl Cli {
    /// Overlay flags onto options loaded from file or defaults.
    fn apply(&self, mut options: ConformanceOptions) -> CliResult<ConformanceOptions> {
        if let Some(class) = &self.gateway_class {
            options.gateway_class = class.clone();
        }
        if let Some(raw) = &self.supported_features {
            options.supported_features = parse_list(raw);
        }
        if let Some(raw) = &self.exempt_features {
            options.exempt_features = parse_list(raw);
        }
        if self.all_features {
            options.enable_all_features = true;
        }
        if let Some(channel) = self.channel {
            options.channel = channel;
        }
        if let Some(raw) = &self.skip_tests {
            options.skip_tests = parse_list(raw);
        }
        if let Some(raw) = &self.namespace_labels {
            options.namespace_labels = parse_namespace_labels(raw)?;
        }
        if let Some(raw) = &self.conformance_profiles {
            options.conformance_profiles = parse_list(raw);
        }

        let implementation = &mut options.implementation;
        for (flag, field) in [
            (&self.organization, &mut implementation.organization),
            (&self.project, &mut implementation.project),
            (&self.url, &mut implementation.url),
            (&self.version, &mut implementation.version),
            (&self.contact, &mut implementation.contact),
        ] {
            if let Some(value) = flag {
                *field = value.clone();
            }
        }

        if let Some(cleanup) = self.cleanup_base_resources {
            options.cleanup = cleanup;
        }
        if self.debug {
            options.debug = true;
        }
        if let Some(secs) = self.test_timeout {
            options.timeouts.test = Duration::from_secs(secs);
        }
        if let Some(retries) = self.retries {
            options.retries = retries;
        }
        if let Some(parallelism) = self.parallelism {
            options.parallelism = parallelism;
        }
        Ok(options)
    }
}

/// Run using the current process arguments.
pub async fn run() -> CliResult<()> {
    run_with_args(std::env::args_os()).await
}

/// Run using the provided argument iterator.
///
/// Only `--simulate` provides a cluster here; embedders with a real cluster
/// client use [`run_with_cluster`].
pub async fn run_with_args<I, T>(args: I) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.debug);

    if !cli.simulate {
        return Err(CliError::NoCluster);
    }
    execute(cli, Arc::new(MemoryCluster::new())).await
}

/// Run the provided arguments against a caller-supplied cluster.
pub async fn run_with_cluster<I, T>(args: I, cluster: Arc<dyn ClusterClient>) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.debug);
    execute(cli, cluster).await
}

fn init_tracing(debug: bool) {
    let filter = if debug { "debug" } else { "info" };
    // Ignored when a subscriber is already installed (repeated in-process runs).
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init();
}

async fn execute(cli: Cli, cluster: Arc<dyn ClusterClient>) -> CliResult<()> {
    let base = match &cli.config {
        Some(path) => config::load_options(path)?,
        None => ConformanceOptions::default(),
    };
    let options = cli.apply(base)?;

    let orchestrator = Orchestrator::new(options, builtin_catalog()?, cluster)?;
    orchestrator.setup().await?;

    let (handle, token) = cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            handle.cancel();
        }
    });

    let result = orchestrator.run(token.clone()).await;
    interrupt.abort();
    let report = result?;

    output::emit(&report, cli.report_output.as_deref())?;

    if token.is_cancelled() {
        return Err(CliError::Cancelled);
    }
    if let Some(reason) = report.aborted {
        return Err(CliError::Aborted(reason));
    }
    Ok(())
}
