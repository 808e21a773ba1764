use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use wpfleet_logging::{LogFormat, LoggingConfig};
use wpfleet_network::dns::SystemResolver;

use wpfleet_api::adapters::{BollardContainers, CaddyEdge, MariaDbAdmin, ZipExtractor};
use wpfleet_api::config::Config;
use wpfleet_api::orchestrate::{Destroyer, DomainManager, Provisioner, StaticProvisioner};
use wpfleet_api::state::AppState;
use wpfleet_api::store::Store;
use wpfleet_api::worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    let logging_config = LoggingConfig::from_env("wpfleet-api")
        .with_level("wpfleet_api=debug,tower_http=debug,wpfleet_logging=info")
        .with_format(match std::env::var("WPFLEET_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Human,
        });
    wpfleet_logging::init_logging(logging_config)?;

    info!(
        service = "wpfleet-api",
        version = env!("CARGO_PKG_VERSION"),
        "starting wpfleet control plane"
    );

    let config = Config::from_env()?;

    let store = Arc::new(Store::connect(&config.control_dsn).await?);
    let container: Arc<dyn wpfleet_api::adapters::ContainerOps> =
        Arc::new(BollardContainers::new(config.docker_host.as_deref())?);
    let appdb_admin = MariaDbAdmin::connect(&config.wp_dsn).await?;
    let appdb: Arc<dyn wpfleet_api::adapters::AppDbOps> = Arc::new(appdb_admin);
    let edge: Arc<dyn wpfleet_api::adapters::EdgeConfigOps> = Arc::new(CaddyEdge::new(
        container.clone(),
        config.edge_container.clone(),
        config.edge_conf_dir.clone(),
        config.edge_cert_dir.clone(),
    ));
    let archive: Arc<dyn wpfleet_api::adapters::ArchiveOps> = Arc::new(ZipExtractor::new());
    let dns: Arc<dyn wpfleet_network::dns::DnsResolve> = Arc::new(SystemResolver::new()?);

    edge.ensure_snippet_dir().await?;

    let public_ip: std::net::Ipv4Addr = config.public_ip.parse()?;
    let domain_manager = Arc::new(DomainManager::new(
        container.clone(),
        edge.clone(),
        appdb.clone(),
        dns.clone(),
        store.clone(),
        config.base_domain.clone(),
        public_ip,
    ));

    let provisioner = Arc::new(Provisioner::new(
        container.clone(),
        edge.clone(),
        appdb.clone(),
        config.docker_network.clone(),
        config.app_server_ip.clone(),
    ));
    let static_provisioner = Arc::new(StaticProvisioner::new(
        container.clone(),
        edge.clone(),
        archive.clone(),
        config.docker_network.clone(),
        config.static_volume.clone(),
    ));
    let destroyer = Arc::new(Destroyer::new(
        container.clone(),
        edge.clone(),
        appdb.clone(),
        config.app_server_ip.clone(),
    ));

    let worker = Worker::new(
        store.clone(),
        provisioner,
        static_provisioner,
        destroyer,
        std::time::Duration::from_secs(config.worker_poll_interval_secs),
        config.stuck_job_timeout_minutes,
    );
    tokio::spawn(worker.run());

    let state = AppState {
        store,
        config: Arc::new(config.clone()),
        container,
        edge,
        appdb,
        archive,
        dns,
        domain_manager,
    };

    let app = wpfleet_api::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!(server.address = %addr, "wpfleet-api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining in-flight requests");
    tokio::time::sleep(std::time::Duration::from_secs(15)).await;
}
