use crate::cli::ServeArgs;
use crate::infra::{load_store, AppState, LocalFileStore, LogNotificationSender};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use directory_billing::billing::{
    BillingApi, BillingStores, ServiceSettings, SubscriptionService, SystemClock,
};
use directory_billing::config::AppConfig;
use directory_billing::error::AppError;
use directory_billing::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(load_store(&config.billing)?);
    let stores = BillingStores::in_memory(
        store,
        Arc::new(LogNotificationSender),
        Arc::new(LocalFileStore),
    );
    let service = Arc::new(SubscriptionService::new(
        stores,
        ServiceSettings::from(&config.billing),
        Arc::new(SystemClock),
    ));
    let policy = service.approval_policy();

    let app = with_operational_routes(BillingApi::new(service, config.billing.request_timeout))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, policy, "directory billing service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
