//! Three-step static-site provisioning transaction: the uploaded archive
//! is staged on disk by the handler before the job is enqueued; this
//! orchestrator only deals with the staged path.

use crate::adapters::archive::ArchiveOps;
use crate::adapters::container::{ContainerOps, ContainerSpec};
use crate::adapters::EdgeConfigOps;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use wpfleet_core::naming;
use wpfleet_core::{Error, Result};

use super::static_edge_snippet;

pub struct StaticProvisioner {
    container: Arc<dyn ContainerOps>,
    edge: Arc<dyn EdgeConfigOps>,
    archive: Arc<dyn ArchiveOps>,
    docker_network: String,
    static_volume: String,
}

#[derive(Default)]
struct Progress {
    files_uploaded: bool,
    snippet_written: bool,
}

impl StaticProvisioner {
    pub fn new(
        container: Arc<dyn ContainerOps>,
        edge: Arc<dyn EdgeConfigOps>,
        archive: Arc<dyn ArchiveOps>,
        docker_network: String,
        static_volume: String,
    ) -> Self {
        Self {
            container,
            edge,
            archive,
            docker_network,
            static_volume,
        }
    }

    pub async fn run(&self, site_id: &str, domain: &str, staged_archive_path: &str) -> Result<()> {
        let mut progress = Progress::default();
        let result = self.run_steps(site_id, domain, staged_archive_path, &mut progress).await;

        if let Err(err) = result {
            self.compensate(&progress, site_id).await;
            return Err(Error::adapter(
                "static_provision",
                format!("static provisioning failed (rolled back): {err}"),
            ));
        }

        if let Err(e) = std::fs::remove_file(staged_archive_path) {
            warn!(path = staged_archive_path, error = %e, "failed to clean up staged archive");
        }

        Ok(())
    }

    async fn run_steps(
        &self,
        site_id: &str,
        domain: &str,
        staged_archive_path: &str,
        progress: &mut Progress,
    ) -> Result<()> {
        // Step 1: extract the archive into the shared static volume, via an
        // ephemeral helper container (scoped acquisition — removed in every
        // path, success or failure).
        let zip_bytes = std::fs::read(staged_archive_path)
            .map_err(|e| Error::adapter("static_provision", e))?;
        let tar_bytes = self.archive.zip_to_tar(zip_bytes).await?;
        let subdir = naming::static_subdir(site_id);

        self.with_ephemeral_container(|name| {
            let container = self.container.clone();
            let subdir = subdir.clone();
            let tar_bytes = tar_bytes.clone();
            Box::pin(async move {
                let dest_dir = format!("/srv/sites/{subdir}");
                let (exit_code, output) = container
                    .exec(&name, &["mkdir".to_string(), "-p".to_string(), dest_dir.clone()])
                    .await?;
                if exit_code != 0 {
                    return Err(Error::adapter("static_provision", format!("mkdir failed: {output}")));
                }
                container.copy_tar(&name, &dest_dir, tar_bytes).await
            })
        })
        .await?;
        progress.files_uploaded = true;

        // Step 2: edge snippet serving the static root.
        let domains = vec![domain.to_string()];
        let snippet = static_edge_snippet(site_id, &domains);
        self.edge.write_snippet(site_id, &snippet).await?;
        progress.snippet_written = true;

        // Step 3: reload the edge router.
        self.edge.reload().await?;

        info!(site_id, domain, "static site provisioned");
        Ok(())
    }

    async fn compensate(&self, progress: &Progress, site_id: &str) {
        warn!(site_id, "static provisioning failed, rolling back completed steps");

        if progress.snippet_written {
            if let Err(e) = self.edge.remove_snippet(site_id).await {
                error!(error = %e, "compensation: failed to remove edge snippet");
            }
            if let Err(e) = self.edge.reload().await {
                error!(error = %e, "compensation: failed to reload edge router");
            }
        }

        if progress.files_uploaded {
            let subdir = naming::static_subdir(site_id);
            let result = self
                .with_ephemeral_container(|name| {
                    let container = self.container.clone();
                    let subdir = subdir.clone();
                    Box::pin(async move {
                        let path = format!("/srv/sites/{subdir}");
                        let (exit_code, output) =
                            container.exec(&name, &["rm".to_string(), "-rf".to_string(), path]).await?;
                        if exit_code != 0 {
                            return Err(Error::adapter(
                                "static_provision",
                                format!("rm -rf failed: {output}"),
                            ));
                        }
                        Ok(())
                    })
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "compensation: failed to remove uploaded static files");
            }
        }
    }

    /// Creates a short-lived container mounting the shared static volume,
    /// runs `work` against it, and removes it unconditionally afterward.
    async fn with_ephemeral_container<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(
            String,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>,
    {
        let name = format!("wpfleet-static-helper-{}", Uuid::new_v4());
        let spec = ContainerSpec {
            name: name.clone(),
            image: "alpine:3.20".to_string(),
            env: HashMap::new(),
            volume_name: self.static_volume.clone(),
            volume_target: "/srv/sites".to_string(),
            volume_read_only: false,
            network: self.docker_network.clone(),
            memory_mb: 64,
            cpus: 0.25,
            pids_limit: 20,
        };

        self.container.create_app(&spec).await?;
        let result = work(name.clone()).await;
        if let Err(e) = self.container.remove(&name, true).await {
            error!(error = %e, "failed to remove ephemeral static helper container");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::archive::FakeArchive;
    use crate::adapters::container::FakeContainers;
    use crate::adapters::edge::FakeEdge;
    use std::io::Write;

    fn staged_archive() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"fake zip bytes").unwrap();
        file
    }

    fn provisioner(
        container: Arc<FakeContainers>,
        edge: Arc<FakeEdge>,
        archive: Arc<FakeArchive>,
    ) -> StaticProvisioner {
        StaticProvisioner::new(
            container,
            edge,
            archive,
            "wpfleet".to_string(),
            "wpfleet-static".to_string(),
        )
    }

    #[tokio::test]
    async fn happy_path_writes_snippet_and_reloads_then_cleans_up_the_staged_file() {
        let container = Arc::new(FakeContainers::new());
        let edge = Arc::new(FakeEdge::new());
        let archive = Arc::new(FakeArchive::new());
        let p = provisioner(container.clone(), edge.clone(), archive.clone());
        let staged = staged_archive();
        let path = staged.path().to_str().unwrap().to_string();

        p.run("mysite", "mysite.fleet.test", &path).await.unwrap();

        assert!(edge.snippet_exists("mysite").await.unwrap());
        assert_eq!(*edge.reload_count.lock().unwrap(), 1);
        assert!(!std::path::Path::new(&path).exists());
    }

    #[tokio::test]
    async fn failure_writing_the_snippet_rolls_back_uploaded_files() {
        let container = Arc::new(FakeContainers::new());
        let edge = Arc::new(FakeEdge::new());
        let archive = Arc::new(FakeArchive::new());
        edge.fail_on("write_snippet");
        let p = provisioner(container.clone(), edge.clone(), archive.clone());
        let staged = staged_archive();
        let path = staged.path().to_str().unwrap().to_string();

        let err = p.run("mysite", "mysite.fleet.test", &path).await.unwrap_err();
        assert!(matches!(err, Error::Adapter { .. }));
        // The staged archive is left in place for the retry to re-read.
        assert!(std::path::Path::new(&path).exists());
    }
}
