//! Deterministic name derivation for every resource that hangs off a site
//! identifier. This is the sole point of name derivation — the state
//! store, the orchestrators, and the reconciler all call through here so
//! they can never drift out of lockstep.

/// `<id>.<base>` — a site's default domain.
pub fn default_domain(site_id: &str, base_domain: &str) -> String {
    format!("{site_id}.{base_domain}")
}

/// Application database and DB user name: `wp_<id>`.
pub fn db_name(site_id: &str) -> String {
    format!("wp_{site_id}")
}

/// The database user is the same name as the database, by convention.
pub fn db_user(site_id: &str) -> String {
    db_name(site_id)
}

/// Shared per-site container volume: `wp_<id>`.
pub fn volume_name(site_id: &str) -> String {
    format!("wp_{site_id}")
}

/// Application container: `php_<id>`.
pub fn app_container_name(site_id: &str) -> String {
    format!("php_{site_id}")
}

/// Static-file sidecar container: `nginx_<id>`.
pub fn sidecar_container_name(site_id: &str) -> String {
    format!("nginx_{site_id}")
}

/// Edge router snippet file name: `<id>.caddy`.
pub fn snippet_file_name(site_id: &str) -> String {
    format!("{site_id}.caddy")
}

/// Subdirectory under the shared static volume for a statically-served
/// site.
pub fn static_subdir(site_id: &str) -> String {
    site_id.to_string()
}

/// Root path the edge router serves a statically-provisioned site from.
pub fn static_root_path(site_id: &str) -> String {
    format!("/srv/sites/{site_id}")
}
