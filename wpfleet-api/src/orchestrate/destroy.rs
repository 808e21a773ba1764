//! Reverse pipeline for tearing down a provisioned site. Every step
//! tolerates "already absent" so a previously-failed destroy can be
//! re-driven; there is no compensation — destruction is designed to be
//! eventually idempotent, not transactional.

use crate::adapters::container::ContainerOps;
use crate::adapters::{AppDbOps, EdgeConfigOps};
use std::sync::Arc;
use tracing::info;
use wpfleet_core::naming;
use wpfleet_core::Result;

pub struct Destroyer {
    container: Arc<dyn ContainerOps>,
    edge: Arc<dyn EdgeConfigOps>,
    appdb: Arc<dyn AppDbOps>,
    app_server_ip: String,
}

impl Destroyer {
    pub fn new(
        container: Arc<dyn ContainerOps>,
        edge: Arc<dyn EdgeConfigOps>,
        appdb: Arc<dyn AppDbOps>,
        app_server_ip: String,
    ) -> Self {
        Self { container, edge, appdb, app_server_ip }
    }

    pub async fn run(&self, site_id: &str) -> Result<()> {
        let db_name = naming::db_name(site_id);
        let db_user = naming::db_user(site_id);
        let volume_name = naming::volume_name(site_id);
        let app_container = naming::app_container_name(site_id);
        let sidecar_container = naming::sidecar_container_name(site_id);

        // Application and sidecar containers first.
        self.container.stop(&app_container, 10).await?;
        self.container.remove(&app_container, true).await?;
        self.container.stop(&sidecar_container, 10).await?;
        self.container.remove(&sidecar_container, true).await?;

        // Shared volume.
        self.container.volume_remove(&volume_name, true).await?;

        // Edge snippet and reload.
        self.edge.remove_snippet(site_id).await?;
        self.edge.reload().await?;

        // Application database and user last.
        self.appdb.drop_database_and_user(&db_name, &db_user, &self.app_server_ip).await?;

        info!(site_id, "site destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::appdb::FakeAppDb;
    use crate::adapters::container::FakeContainers;
    use crate::adapters::edge::FakeEdge;

    #[tokio::test]
    async fn destroying_an_already_absent_site_succeeds() {
        let container = Arc::new(FakeContainers::new());
        let edge = Arc::new(FakeEdge::new());
        let appdb = Arc::new(FakeAppDb::new());
        let d = Destroyer::new(container, edge, appdb, "10.0.0.5".to_string());

        // Nothing was ever provisioned for "ghost"; every step should
        // tolerate "already absent" and the whole thing still succeeds.
        d.run("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn destroying_a_provisioned_site_removes_every_resource() {
        let container = Arc::new(FakeContainers::new());
        let edge = Arc::new(FakeEdge::new());
        let appdb = Arc::new(FakeAppDb::new());

        container.volume_create("wp_mysite").await.unwrap();
        appdb
            .create_database_and_user("wp_mysite", "wp_mysite", "secret", "10.0.0.5")
            .await
            .unwrap();
        edge.write_snippet("mysite", "route {}").await.unwrap();

        let d = Destroyer::new(container.clone(), edge.clone(), appdb.clone(), "10.0.0.5".to_string());
        d.run("mysite").await.unwrap();

        assert!(!container.volumes.lock().unwrap().contains("wp_mysite"));
        assert!(!appdb.databases.lock().unwrap().contains_key("wp_mysite"));
        assert!(!edge.snippet_exists("mysite").await.unwrap());
    }

    #[tokio::test]
    async fn re_driving_a_partially_destroyed_site_finishes_the_job() {
        let container = Arc::new(FakeContainers::new());
        let edge = Arc::new(FakeEdge::new());
        let appdb = Arc::new(FakeAppDb::new());

        // Simulate a crash after the volume was already removed but before
        // the database was dropped.
        appdb
            .create_database_and_user("wp_mysite", "wp_mysite", "secret", "10.0.0.5")
            .await
            .unwrap();

        let d = Destroyer::new(container.clone(), edge.clone(), appdb.clone(), "10.0.0.5".to_string());
        d.run("mysite").await.unwrap();

        assert!(!appdb.databases.lock().unwrap().contains_key("wp_mysite"));
    }
}
