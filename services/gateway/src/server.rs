use crate::cli::ServeArgs;
use crate::infra::{AppState, OutboxPlatform};
use crate::routes::with_gateway_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use squadron_intake::config::AppConfig;
use squadron_intake::error::AppError;
use squadron_intake::telemetry;
use squadron_intake::workflows::intake::{CsvApplicationRepository, IntakeAssets, IntakeBot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let assets = IntakeAssets::load(&config.intake.assets)?;
    let repository = Arc::new(CsvApplicationRepository::new(
        &config.intake.store_path,
        &assets.catalog,
    ));
    let outbox = Arc::new(OutboxPlatform::default());
    let bot = Arc::new(IntakeBot::new(
        assets,
        repository,
        outbox.clone(),
        config.intake.bot_settings(),
    ));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_gateway_routes(bot, outbox)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        store = %config.intake.store_path.display(),
        "squadron intake gateway ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(readiness_flag))
        .await?;
    info!("squadron intake gateway stopped");
    Ok(())
}

async fn shutdown_signal(readiness: Arc<AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    readiness.store(false, Ordering::Release);
    info!("shutdown requested, draining connections");
}
