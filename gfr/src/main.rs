//! GPU Fault Remediator (GFR)
//!
//! Watches GPU nodes through their DCGM exporters, asks an external
//! classifier what each node's evidence means and drives faulty nodes
//! through cordon, drain, reboot or replace and back into service.

mod cli;
mod config;
mod exclusions;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{ActionArgs, Cli, Command, RunArgs};
use config::Config;
use gfr_aws::notify::{LambdaNotifier, SnsNotifier};
use gfr_aws::{AwsCli, AwsInstanceActions};
use gfr_core::exclusion::{ExclusionStore, FileExclusionStore};
use gfr_core::metrics::MetricsRegistry;
use gfr_core::notify::{NotifierSet, WebhookNotifier};
use gfr_core::{FaultMonitor, HttpClassifier, Node, Orchestrator, RemediationAction, RemediationError};
use gfr_k8s::{DcgmCollector, DcgmCollectorConfig, K8sClient, KubeNodeController};

/// Initialize the tracing/logging subsystem
fn init_logging(log_level: &str, json_format: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Build the notification fan-out from the configured channels
fn build_notifier(config: &Config, aws: &Arc<AwsCli>) -> Result<NotifierSet> {
    let notifications = &config.notifications;
    let mut set = NotifierSet::new(notifications.cluster_name.clone());

    if let Some(url) = &notifications.webhook_url {
        let webhook = WebhookNotifier::new(url.clone(), notifications.webhook_timeout)
            .context("Failed to create webhook notifier")?;
        set = set.with_channel(Arc::new(webhook));
    }
    if let Some(topic) = &notifications.sns_topic_arn {
        set = set.with_channel(Arc::new(SnsNotifier::new(aws.clone(), topic.clone())));
    }
    if let Some(function) = &notifications.lambda_function {
        set = set.with_channel(Arc::new(LambdaNotifier::new(aws.clone(), function.clone())));
    }

    info!(channels = ?set.channel_names(), "Notification channels configured");
    Ok(set)
}

/// Wire the orchestrator to the cluster, the cloud and the exclusion ledger
async fn build_orchestrator(config: &Config, metrics: Arc<MetricsRegistry>) -> Result<(Orchestrator, K8sClient)> {
    let aws = Arc::new(AwsCli::new(config.aws.clone()));
    let k8s_client = K8sClient::new().await?;

    let store: Arc<dyn ExclusionStore> =
        Arc::new(FileExclusionStore::new(config.exclusions.path.clone()));
    let nodes = Arc::new(KubeNodeController::new(k8s_client.clone(), config.dry_run));
    let instances = Arc::new(AwsInstanceActions::new(aws.clone(), config.dry_run));
    let notifier = Arc::new(build_notifier(config, &aws)?);

    let orchestrator = Orchestrator::new(
        store,
        nodes,
        instances,
        notifier,
        metrics,
        config.remediation.clone(),
    )
    .with_exclusion_ttl(config.exclusions.ttl);

    Ok((orchestrator, k8s_client))
}

/// Run the monitor loop, or a single pass with `--once`
async fn run(config: Config, args: RunArgs, shutdown_rx: watch::Receiver<bool>) -> Result<ExitCode> {
    let endpoint = config
        .classifier
        .endpoint
        .clone()
        .context("classifier.endpoint must be set to run the monitor")?;

    let metrics = Arc::new(MetricsRegistry::new());
    let (orchestrator, k8s_client) = build_orchestrator(&config, metrics.clone()).await?;

    let collector = DcgmCollector::new(
        k8s_client,
        DcgmCollectorConfig {
            namespace: config.collector.namespace.clone(),
            label_selector: config.collector.label_selector.clone(),
            metrics_port: config.collector.metrics_port,
            scrape_timeout: config.collector.scrape_timeout,
        },
    )
    .context("Failed to create DCGM collector")?;
    let classifier = HttpClassifier::new(endpoint, config.classifier.timeout)
        .context("Failed to create classifier client")?;

    let monitor = FaultMonitor::new(
        Arc::new(collector),
        Arc::new(classifier),
        Arc::new(orchestrator),
        config.policy.clone(),
        metrics.clone(),
        config.poll_interval,
    );

    if args.once {
        let report = monitor.run_once().await;
        info!(
            healthy = report.healthy.len(),
            excluded = report.excluded.len(),
            skipped = report.skipped.len(),
            observed = report.observed.len(),
            held = report.held.len(),
            remediated = report.results.len(),
            "Single pass complete"
        );

        let clean = report.held.is_empty() && report.results.iter().all(|r| r.success());
        return Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    if config.metrics.enabled {
        let port = config.metrics.port;
        let registry = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port, registry).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    monitor.run(shutdown_rx).await;

    info!("GFR shutdown complete");
    Ok(ExitCode::SUCCESS)
}

/// Remediate one node on demand
async fn remediate(config: Config, action: RemediationAction, args: ActionArgs) -> Result<ExitCode> {
    let mut config = config;
    if let Some(wait) = args.wait {
        let wait = Duration::from_secs(wait);
        match action {
            RemediationAction::Replace => config.remediation.replace_wait = wait,
            _ => config.remediation.reboot_wait = wait,
        }
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let (orchestrator, _) = build_orchestrator(&config, metrics).await?;

    let node = Node::new(args.node, args.instance_id);
    let reason = args
        .reason
        .unwrap_or_else(|| format!("MANUAL_{}", action.to_string().to_uppercase()));

    match orchestrator.run(&node, action, &reason).await {
        Ok(result) => {
            let summary =
                serde_json::to_string_pretty(&result).context("Failed to render result")?;
            println!("{}", summary);
            Ok(ExitCode::from(result.outcome.exit_code()))
        }
        Err(RemediationError::AlreadyExcluded { node }) => {
            error!(node = %node, "Node is already excluded; another remediation owns it");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("Remediation could not start"),
    }
}

/// Start the Prometheus metrics HTTP server
async fn start_metrics_server(port: u16, metrics: Arc<MetricsRegistry>) -> Result<()> {
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = port, "Metrics server listening");

    loop {
        let (mut socket, _) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buf = [0; 1024];
            let _ = socket.read(&mut buf).await;

            let metrics_output = metrics.render();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
                metrics_output.len(),
                metrics_output
            );

            let _ = socket.write_all(response.as_bytes()).await;
        });
    }
}

/// Flip the shutdown channel on Ctrl+C or SIGTERM
async fn wait_for_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }

    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(&cli.log_level(), cli.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "GFR starting");

    // Load configuration
    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("Failed to load config from {:?}", cli.config))?
    } else {
        warn!(path = ?cli.config, "Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Command::Run(RunArgs { interval: Some(secs), .. }) = &cli.command {
        config.poll_interval = Duration::from_secs(*secs);
    }

    config = config.with_notifications_from_env();

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    info!(dry_run = config.dry_run, "Configuration loaded");

    match cli.command {
        Command::Run(args) => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(wait_for_signal(shutdown_tx));
            run(config, args, shutdown_rx).await
        }
        Command::Reboot(args) => remediate(config, RemediationAction::Reboot, args).await,
        Command::Replace(args) => remediate(config, RemediationAction::Replace, args).await,
        Command::Exclusions { command } => {
            let store = FileExclusionStore::new(config.exclusions.path.clone());
            exclusions::execute(&store, command, &mut std::io::stdout().lock())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
