mod kube_client;
mod notifier;

use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder};
use clap::{crate_authors, crate_description, crate_version, Parser};
use kube::Config;
use prometheus_client::registry::Registry;
use std::sync::Arc;

use k0rdent_mcp_k8s_util::client::new_client_with_metrics;
use k0rdent_mcp_monitor::manager::MonitorManager;
use k0rdent_mcp_monitor::metrics::MonitorMetrics;
use k0rdent_mcp_monitor::telemetry;
use k0rdent_mcp_monitor::MonitorConfig;

use kube_client::KubeClientFactory;
use notifier::LoggingNotifier;

/// Shared between the web server and whatever MCP transport the embedding
/// binary wires in; `monitor` is the handle that transport's request
/// handlers call `subscribe`/`unsubscribe`/`get_state` on.
#[derive(Clone)]
struct AppState {
    #[allow(dead_code)]
    monitor: Arc<MonitorManager>,
    registry: Arc<Registry>,
}

#[get("/metrics")]
async fn metrics(state: Data<AppState>, _req: HttpRequest) -> impl Responder {
    let mut buffer = String::new();
    match prometheus_client::encoding::text::encode(&mut buffer, &state.registry) {
        Ok(()) => HttpResponse::Ok()
            .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
            .body(buffer),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {:?}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[derive(Parser, Debug)]
#[command(
    name = "k0rdent-mcp-server",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on given port
    #[arg(short, long, default_value_t = 8080, env)]
    port: u32,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`. Example: "info,kube=debug,k0rdent_mcp_monitor=debug"
    #[arg(long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint. If not provided, tracing is disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    let mut registry = Registry::with_prefix("k0rdent_mcp_server");
    let config = Config::infer().await?;
    let client = new_client_with_metrics(config, &mut registry).await?;
    let client_factory = KubeClientFactory::new(client);
    let monitor_metrics = Arc::new(MonitorMetrics::default().register(&mut registry));

    let monitor = MonitorManager::new(
        client_factory,
        Arc::new(LoggingNotifier),
        MonitorConfig::from_env(),
        monitor_metrics,
    );

    let state = AppState {
        monitor: monitor.clone(),
        registry: Arc::new(registry),
    };

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(health)
            .service(metrics)
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    // actix handles SIGINT/SIGTERM itself and drains in-flight HTTP requests
    // within `shutdown_timeout`; once it returns, cancel every live
    // subscription and await `Closed` before the process exits (§9 "Global
    // state").
    server.run().await?;
    monitor.shutdown().await;
    Ok(())
}
