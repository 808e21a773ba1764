use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Immutable, process-wide configuration, read once at startup and
/// injected into every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_port: u16,
    pub api_key: String,
    pub control_dsn: String,
    pub wp_dsn: String,
    pub docker_host: Option<String>,
    pub docker_cert_dir: Option<String>,
    pub edge_container: String,
    pub edge_conf_dir: String,
    pub edge_cert_dir: String,
    pub static_volume: String,
    pub base_domain: String,
    pub public_ip: String,
    pub app_server_ip: String,
    pub docker_network: String,
    pub worker_poll_interval_secs: u64,
    pub stuck_job_timeout_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_port: env_or("API_PORT", "8080").parse().context("API_PORT")?,
            api_key: std::env::var("API_KEY").context("API_KEY is required")?,
            control_dsn: env_or("CONTROL_DSN", "sqlite://wpfleet.db"),
            wp_dsn: std::env::var("WP_DSN").context("WP_DSN is required")?,
            docker_host: std::env::var("DOCKER_HOST").ok(),
            docker_cert_dir: std::env::var("DOCKER_CERT_DIR").ok(),
            edge_container: env_or("EDGE_CONTAINER", "wpfleet-edge"),
            edge_conf_dir: env_or("EDGE_CONF_DIR", "/etc/caddy/sites"),
            edge_cert_dir: env_or("EDGE_CERT_DIR", "/data/caddy/certificates"),
            static_volume: env_or("STATIC_VOLUME", "wpfleet-static"),
            base_domain: env_or("BASE_DOMAIN", "fleet.test"),
            public_ip: std::env::var("PUBLIC_IP").context("PUBLIC_IP is required")?,
            app_server_ip: std::env::var("APP_SERVER_IP").context("APP_SERVER_IP is required")?,
            docker_network: env_or("DOCKER_NETWORK", "wpfleet"),
            worker_poll_interval_secs: env_or("WORKER_POLL_INTERVAL", "3")
                .parse()
                .context("WORKER_POLL_INTERVAL")?,
            stuck_job_timeout_minutes: env_or("STUCK_JOB_TIMEOUT_MIN", "10")
                .parse()
                .context("STUCK_JOB_TIMEOUT_MIN")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "API_PORT",
            "API_KEY",
            "CONTROL_DSN",
            "WP_DSN",
            "DOCKER_HOST",
            "DOCKER_CERT_DIR",
            "EDGE_CONTAINER",
            "EDGE_CONF_DIR",
            "EDGE_CERT_DIR",
            "STATIC_VOLUME",
            "BASE_DOMAIN",
            "PUBLIC_IP",
            "APP_SERVER_IP",
            "DOCKER_NETWORK",
            "WORKER_POLL_INTERVAL",
            "STUCK_JOB_TIMEOUT_MIN",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn missing_required_vars_fail_loudly() {
        clear_env();
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn defaults_apply_when_optional_vars_are_unset() {
        clear_env();
        std::env::set_var("API_KEY", "secret");
        std::env::set_var("WP_DSN", "mysql://root@127.0.0.1/mysql");
        std::env::set_var("PUBLIC_IP", "203.0.113.5");
        std::env::set_var("APP_SERVER_IP", "10.0.0.5");

        let config = Config::from_env().unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.base_domain, "fleet.test");
        assert_eq!(config.worker_poll_interval_secs, 3);
        assert_eq!(config.stuck_job_timeout_minutes, 10);
        clear_env();
    }
}
