use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;

use ng_domain::config::{Config, LoggingConfig, ObservabilityConfig};
use ng_gateway::cli::{Cli, Command, ConfigCommand};
use ng_gateway::{api, bootstrap, routes, transport};
use ng_protocol::CloseReason;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let config = ng_gateway::cli::load_config(&cli)?;
            let telemetry = init_tracing(&config.logging, &config.observability);
            run_server(Arc::new(config), telemetry).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = ng_gateway::cli::load_config(&cli)?;
            if !ng_gateway::cli::config::validate(&config, &cli.config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = ng_gateway::cli::load_config(&cli)?;
            print!("{}", ng_gateway::cli::config::show(&config)?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("nodegate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Handles that must outlive the server so buffered telemetry is flushed.
struct Telemetry {
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
    _file_guard: Option<WorkerGuard>,
}

/// Initialize structured JSON tracing.
///
/// Records go to stdout, to `logging.file` when set, and to an OTLP
/// collector when `otlp_endpoint` is configured.  `RUST_LOG` overrides the
/// configured level.
fn init_tracing(logging: &LoggingConfig, obs: &ObservabilityConfig) -> Telemetry {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directive()));

    let fmt_layer = tracing_subscriber::fmt::layer().json();

    // ── Optional file layer ──────────────────────────────────────────
    let (file_layer, file_guard) = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "nodegate.log".into());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // ── Optional OpenTelemetry layer ─────────────────────────────────
    let tracer_provider = obs.otlp_endpoint.as_ref().and_then(|endpoint| {
        let exporter = match opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
        {
            Ok(e) => e,
            Err(e) => {
                eprintln!(
                    "WARNING: failed to create OTLP exporter for {endpoint}: {e}, \
                     starting without OpenTelemetry"
                );
                return None;
            }
        };

        let resource = opentelemetry_sdk::Resource::builder()
            .with_service_name(obs.service_name.clone())
            .build();

        Some(
            opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
                    obs.sample_rate,
                ))
                .with_resource(resource)
                .build(),
        )
    });
    let otel_layer = tracer_provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("nodegate")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer)
        .with(otel_layer)
        .init();

    Telemetry {
        tracer_provider,
        _file_guard: file_guard,
    }
}

/// Start the gateway with the given configuration.
async fn run_server(config: Arc<Config>, telemetry: Telemetry) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "nodegate starting");

    // ── Transport (TLS material is read before anything binds) ──────
    let transport = transport::prepare(&config.server)
        .await
        .context("preparing transport")?;
    let scheme = transport.scheme();

    // ── Build shared state & spawn background loops ──────────────────
    let state = bootstrap::build_app_state(config.clone(), transport.is_tls())?;
    bootstrap::spawn_background_tasks(&state);

    // ── Router ───────────────────────────────────────────────────────
    let business = routes::business_router(&config.server.public_dir);
    let app = api::app(state.clone(), business);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = config.server.bind_addr();
    let server = transport::bind(transport, &addr).await?;
    tracing::info!(addr = %addr, scheme, "nodegate listening");

    {
        let state = state.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            let closed = state.channels.close_all(CloseReason::Shutdown);
            tracing::info!(channels = closed, "closing open channels");
            state.shutdown.cancel();
        });
    }

    server
        .serve(app, state.shutdown.clone())
        .await
        .context("server error")?;

    // ── Post-shutdown flush ─────────────────────────────────────────
    state.shutdown.cancel();
    if let Some(provider) = telemetry.tracer_provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot register SIGTERM handler");
                let _ = ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
