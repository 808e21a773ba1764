//! Seven-step WordPress-style provisioning transaction.

use crate::adapters::container::{ContainerOps, ContainerSpec};
use crate::adapters::{AppDbOps, EdgeConfigOps};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use wpfleet_core::naming;
use wpfleet_core::{Error, Result};

use super::{generate_password, sidecar_server_block, wordpress_edge_snippet, APP_PROFILE, SIDECAR_PROFILE};

pub struct Provisioner {
    container: Arc<dyn ContainerOps>,
    edge: Arc<dyn EdgeConfigOps>,
    appdb: Arc<dyn AppDbOps>,
    docker_network: String,
    app_server_ip: String,
}

/// Tracks which steps completed, so a failure partway through knows
/// exactly what to unwind and in what order.
#[derive(Default)]
struct Progress {
    db_created: bool,
    vol_created: bool,
    app_created: bool,
    sidecar_created: bool,
    snippet_written: bool,
}

impl Provisioner {
    pub fn new(
        container: Arc<dyn ContainerOps>,
        edge: Arc<dyn EdgeConfigOps>,
        appdb: Arc<dyn AppDbOps>,
        docker_network: String,
        app_server_ip: String,
    ) -> Self {
        Self {
            container,
            edge,
            appdb,
            docker_network,
            app_server_ip,
        }
    }

    pub async fn run(&self, site_id: &str, domain: &str) -> Result<()> {
        let db_name = naming::db_name(site_id);
        let db_user = naming::db_user(site_id);
        let volume_name = naming::volume_name(site_id);
        let app_container = naming::app_container_name(site_id);
        let sidecar_container = naming::sidecar_container_name(site_id);
        let password = generate_password();

        let mut progress = Progress::default();
        let result = self
            .run_steps(
                site_id,
                domain,
                &db_name,
                &db_user,
                &password,
                &volume_name,
                &app_container,
                &sidecar_container,
                &mut progress,
            )
            .await;

        if let Err(err) = result {
            self.compensate(
                &progress,
                site_id,
                &db_name,
                &db_user,
                &volume_name,
                &app_container,
                &sidecar_container,
            )
            .await;
            return Err(Error::adapter(
                "provision",
                format!("provisioning failed (rolled back): {err}"),
            ));
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_steps(
        &self,
        site_id: &str,
        domain: &str,
        db_name: &str,
        db_user: &str,
        password: &str,
        volume_name: &str,
        app_container: &str,
        sidecar_container: &str,
        progress: &mut Progress,
    ) -> Result<()> {
        // Step 1: application database + user.
        self.appdb
            .create_database_and_user(db_name, db_user, password, &self.app_server_ip)
            .await?;
        progress.db_created = true;

        // Step 2: shared volume.
        self.container.volume_create(volume_name).await?;
        progress.vol_created = true;

        // Step 3: application container.
        let mut env = HashMap::new();
        env.insert("WORDPRESS_DB_HOST".to_string(), self.app_server_ip.clone());
        env.insert("WORDPRESS_DB_NAME".to_string(), db_name.to_string());
        env.insert("WORDPRESS_DB_USER".to_string(), db_user.to_string());
        env.insert("WORDPRESS_DB_PASSWORD".to_string(), password.to_string());

        let app_spec = ContainerSpec {
            name: app_container.to_string(),
            image: "wordpress:php8.2-fpm".to_string(),
            env,
            volume_name: volume_name.to_string(),
            volume_target: "/var/www/html".to_string(),
            volume_read_only: false,
            network: self.docker_network.clone(),
            memory_mb: APP_PROFILE.memory_mb,
            cpus: APP_PROFILE.cpus,
            pids_limit: APP_PROFILE.pids_limit,
        };
        self.container.create_app(&app_spec).await?;
        progress.app_created = true;

        // Step 4: sidecar container, read-only mount of the same volume.
        let sidecar_spec = ContainerSpec {
            name: sidecar_container.to_string(),
            image: "nginx:1.27-alpine".to_string(),
            env: HashMap::new(),
            volume_name: volume_name.to_string(),
            volume_target: "/var/www/html".to_string(),
            volume_read_only: true,
            network: self.docker_network.clone(),
            memory_mb: SIDECAR_PROFILE.memory_mb,
            cpus: SIDECAR_PROFILE.cpus,
            pids_limit: SIDECAR_PROFILE.pids_limit,
        };
        self.container.create_sidecar(&sidecar_spec).await?;
        progress.sidecar_created = true;

        // Step 5: sidecar server block + live reload.
        let domains = vec![domain.to_string()];
        let block = sidecar_server_block(app_container, &domains);
        let tar_bytes = build_tar("default.conf", &block)?;
        self.container
            .copy_tar(sidecar_container, "/etc/nginx/conf.d", tar_bytes)
            .await?;
        let (exit_code, output) = self
            .container
            .exec(sidecar_container, &["nginx".to_string(), "-s".to_string(), "reload".to_string()])
            .await?;
        if exit_code != 0 {
            return Err(Error::adapter("provision", format!("sidecar reload failed: {output}")));
        }

        // Step 6: edge snippet.
        let snippet = wordpress_edge_snippet(sidecar_container, &domains);
        self.edge.write_snippet(site_id, &snippet).await?;
        progress.snippet_written = true;

        // Step 7: reload the edge router.
        self.edge.reload().await?;

        info!(site_id, domain, "site provisioned");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn compensate(
        &self,
        progress: &Progress,
        site_id: &str,
        db_name: &str,
        db_user: &str,
        volume_name: &str,
        app_container: &str,
        sidecar_container: &str,
    ) {
        warn!(site_id, "provisioning failed, rolling back completed steps");

        if progress.snippet_written {
            if let Err(e) = self.edge.remove_snippet(site_id).await {
                error!(error = %e, "compensation: failed to remove edge snippet");
            }
            if let Err(e) = self.edge.reload().await {
                error!(error = %e, "compensation: failed to reload edge router");
            }
        }

        if progress.sidecar_created {
            let _ = self.container.stop(sidecar_container, 10).await;
            if let Err(e) = self.container.remove(sidecar_container, true).await {
                error!(error = %e, "compensation: failed to remove sidecar container");
            }
        }

        if progress.app_created {
            let _ = self.container.stop(app_container, 10).await;
            if let Err(e) = self.container.remove(app_container, true).await {
                error!(error = %e, "compensation: failed to remove app container");
            }
        }

        if progress.vol_created {
            if let Err(e) = self.container.volume_remove(volume_name, true).await {
                error!(error = %e, "compensation: failed to remove volume");
            }
        }

        if progress.db_created {
            if let Err(e) =
                self.appdb.drop_database_and_user(db_name, db_user, &self.app_server_ip).await
            {
                error!(error = %e, "compensation: failed to drop database and user");
            }
        }
    }
}

fn build_tar(file_name: &str, contents: &str) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, file_name, contents.as_bytes())
        .map_err(|e| Error::adapter("provision", e))?;
    builder.into_inner().map_err(|e| Error::adapter("provision", e))
}
