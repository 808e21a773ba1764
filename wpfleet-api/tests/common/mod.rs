use sqlx::sqlite::SqlitePoolOptions;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;
use wpfleet_api::adapters::{FakeAppDb, FakeArchive, FakeContainers, FakeEdge};
use wpfleet_api::orchestrate::{Destroyer, DomainManager, Provisioner, StaticProvisioner};
use wpfleet_api::{AppState, Config, Store};
use wpfleet_network::dns::FakeResolver;

pub const API_KEY: &str = "test-api-key";
pub const PUBLIC_IP: &str = "203.0.113.5";

pub fn test_config() -> Config {
    Config {
        api_port: 0,
        api_key: API_KEY.to_string(),
        control_dsn: "sqlite::memory:".to_string(),
        wp_dsn: "mysql://unused".to_string(),
        docker_host: None,
        docker_cert_dir: None,
        edge_container: "wpfleet-edge".to_string(),
        edge_conf_dir: "/etc/caddy/sites".to_string(),
        edge_cert_dir: "/data/caddy/certificates".to_string(),
        static_volume: "wpfleet-static".to_string(),
        base_domain: "fleet.test".to_string(),
        public_ip: PUBLIC_IP.to_string(),
        app_server_ip: "10.0.0.5".to_string(),
        docker_network: "wpfleet".to_string(),
        worker_poll_interval_secs: 3600,
        stuck_job_timeout_minutes: 10,
    }
}

/// Everything a test wants direct access to: the router is already mounted
/// behind a real TCP listener, and the fakes are exposed so assertions can
/// inspect what infrastructure calls actually happened.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub container: Arc<FakeContainers>,
    pub edge: Arc<FakeEdge>,
    pub appdb: Arc<FakeAppDb>,
    pub dns: Arc<FakeResolver>,
    pub store: Arc<Store>,
    _server: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A request builder pre-populated with the shared-secret header every
    /// protected endpoint requires.
    pub fn authed(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, self.url(path)).header("x-api-key", API_KEY)
    }
}

pub async fn spawn() -> TestApp {
    spawn_with_poll_interval(std::time::Duration::from_millis(20)).await
}

/// A variant whose background worker never actually ticks during a normal
/// test's lifetime, for assertions that need a job to stay `PENDING`
/// deterministically rather than racing the worker to claim it.
pub async fn spawn_idle() -> TestApp {
    spawn_with_poll_interval(std::time::Duration::from_secs(3600)).await
}

pub async fn spawn_with_poll_interval(poll_interval: std::time::Duration) -> TestApp {
    let config = test_config();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool");
    let store = Arc::new(Store::from_pool(pool).await.expect("run migrations"));

    let container = Arc::new(FakeContainers::new());
    let edge = Arc::new(FakeEdge::new());
    let appdb = Arc::new(FakeAppDb::new());
    let archive = Arc::new(FakeArchive::new());
    let dns = Arc::new(FakeResolver::new());

    let public_ip: Ipv4Addr = PUBLIC_IP.parse().unwrap();
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

    let worker = wpfleet_api::worker::Worker::new(
        store.clone(),
        provisioner,
        static_provisioner,
        destroyer,
        poll_interval,
        config.stuck_job_timeout_minutes,
    );
    tokio::spawn(worker.run());

    let state = AppState {
        store: store.clone(),
        config: Arc::new(config),
        container: container.clone(),
        edge: edge.clone(),
        appdb: appdb.clone(),
        archive: archive.clone(),
        dns: dns.clone(),
        domain_manager,
    };

    let app = wpfleet_api::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server crashed");
    });

    // Give the listener a moment to start accepting.
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    TestApp {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        container,
        edge,
        appdb,
        dns,
        store,
        _server: server,
    }
}

/// Polls until the given site reaches one of `targets`, or panics after
/// `attempts` polls of 20ms each. The worker runs on a 20ms interval in
/// tests, so a handful of attempts is plenty of margin.
pub async fn wait_for_status(
    app: &TestApp,
    site_id: &str,
    targets: &[wpfleet_core::models::SiteStatus],
    attempts: u32,
) -> wpfleet_core::models::Site {
    for _ in 0..attempts {
        let site = app.store.get_site(site_id).await.expect("site must exist");
        if targets.contains(&site.status) {
            return site;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    panic!("site '{site_id}' never reached {targets:?}");
}
