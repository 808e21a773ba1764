//! Multi-step infrastructure transactions: one plain struct per operation,
//! each holding the capability handles it needs and exposing a single
//! `run`/`attach`/`detach` entry point. None of these types touch the state
//! store directly — the worker and handlers own reading/writing job and
//! site rows; these orchestrators only drive external systems through the
//! adapter traits and report what happened.

pub mod destroy;
pub mod domain;
pub mod provision;
pub mod static_provision;

pub use destroy::Destroyer;
pub use domain::DomainManager;
pub use provision::Provisioner;
pub use static_provision::StaticProvisioner;

/// Shared container sizing used by both the application and the static
/// sidecar.
pub(crate) struct ResourceProfile {
    pub memory_mb: i64,
    pub cpus: f64,
    pub pids_limit: i64,
}

pub(crate) const APP_PROFILE: ResourceProfile = ResourceProfile {
    memory_mb: 512,
    cpus: 1.0,
    pids_limit: 100,
};

pub(crate) const SIDECAR_PROFILE: ResourceProfile = ResourceProfile {
    memory_mb: 128,
    cpus: 0.5,
    pids_limit: 50,
};

/// Generates a random, alphanumeric-only password suitable for binding
/// into a MariaDB `IDENTIFIED BY` clause without further escaping.
pub(crate) fn generate_password() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Builds the nginx sidecar server block for a site, passing PHP through
/// to the application container by its internal name.
pub(crate) fn sidecar_server_block(app_container: &str, domains: &[String]) -> String {
    let server_names = domains.join(" ");
    format!(
        "server {{\n    listen 8080;\n    server_name {server_names};\n    root /var/www/html;\n    index index.php;\n\n    location / {{\n        try_files $uri $uri/ /index.php?$args;\n    }}\n\n    location ~ \\.php$ {{\n        fastcgi_pass {app_container}:9000;\n        fastcgi_index index.php;\n        include fastcgi_params;\n        fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;\n    }}\n}}\n"
    )
}

/// Builds the edge router routing snippet for a WordPress-style site.
pub(crate) fn wordpress_edge_snippet(sidecar_container: &str, domains: &[String]) -> String {
    let hosts = domains.join(", ");
    format!("{hosts} {{\n    reverse_proxy {sidecar_container}:8080\n}}\n")
}

/// Builds the edge router routing snippet for a statically-served site.
pub(crate) fn static_edge_snippet(site_id: &str, domains: &[String]) -> String {
    let hosts = domains.join(", ");
    let root = wpfleet_core::naming::static_root_path(site_id);
    format!("{hosts} {{\n    root * {root}\n    file_server\n}}\n")
}
