//! `EdgeConfigOps` — the capability that materializes per-site routing
//! snippets for the edge router container and triggers it to pick them up.
//! Built on top of [`ContainerOps`] rather than a second Docker client,
//! since the only things this adapter needs from the container runtime are
//! "write a file into a volume" and
//! "run a reload command" — both already expressed by that trait.

use crate::adapters::container::ContainerOps;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;
use wpfleet_core::{Error, Result};

#[async_trait]
pub trait EdgeConfigOps: Send + Sync {
    async fn ensure_snippet_dir(&self) -> Result<()>;
    async fn write_snippet(&self, site_domain: &str, contents: &str) -> Result<()>;
    async fn remove_snippet(&self, site_domain: &str) -> Result<()>;
    async fn reload(&self) -> Result<()>;
    async fn snippet_exists(&self, site_domain: &str) -> Result<bool>;
    async fn snippet_contains(&self, site_domain: &str, needle: &str) -> Result<bool>;
    async fn cert_on_disk(&self, domain: &str) -> Result<bool>;
}

/// Real implementation: writes Caddy/nginx-style routing snippets into the
/// edge container's shared config volume via a tar upload, then execs a
/// reload signal inside that container.
pub struct CaddyEdge {
    container: std::sync::Arc<dyn ContainerOps>,
    edge_container_name: String,
    snippet_dir: String,
    cert_dir: String,
}

impl CaddyEdge {
    pub fn new(
        container: std::sync::Arc<dyn ContainerOps>,
        edge_container_name: String,
        snippet_dir: String,
        cert_dir: String,
    ) -> Self {
        Self {
            container,
            edge_container_name,
            snippet_dir,
            cert_dir,
        }
    }

    fn snippet_file_name(site_domain: &str) -> String {
        wpfleet_core::naming::snippet_file_name(site_domain)
    }

    fn build_tar(&self, file_name: &str, contents: &str) -> Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, file_name, contents.as_bytes())
            .map_err(|e| Error::adapter("edge", e))?;
        builder.into_inner().map_err(|e| Error::adapter("edge", e))
    }
}

#[async_trait]
impl EdgeConfigOps for CaddyEdge {
    async fn ensure_snippet_dir(&self) -> Result<()> {
        // The directory is created by the edge image itself; nothing to do
        // beyond confirming the container exists and is reachable.
        self.container.exec(&self.edge_container_name, &[
            "mkdir".to_string(),
            "-p".to_string(),
            self.snippet_dir.clone(),
        ]).await?;
        Ok(())
    }

    async fn write_snippet(&self, site_domain: &str, contents: &str) -> Result<()> {
        let file_name = Self::snippet_file_name(site_domain);
        let tar_bytes = self.build_tar(&file_name, contents)?;
        info!(domain = site_domain, "writing edge routing snippet");
        self.container
            .copy_tar(&self.edge_container_name, &self.snippet_dir, tar_bytes)
            .await
    }

    async fn remove_snippet(&self, site_domain: &str) -> Result<()> {
        let file_name = Self::snippet_file_name(site_domain);
        let path = format!("{}/{}", self.snippet_dir.trim_end_matches('/'), file_name);
        let (exit_code, output) = self
            .container
            .exec(&self.edge_container_name, &["rm".to_string(), "-f".to_string(), path])
            .await?;
        if exit_code != 0 {
            return Err(Error::adapter("edge", format!("rm -f failed: {output}")));
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let (exit_code, output) = self
            .container
            .exec(
                &self.edge_container_name,
                &["caddy".to_string(), "reload".to_string(), "--config".to_string(), "/etc/caddy/Caddyfile".to_string()],
            )
            .await?;
        if exit_code != 0 {
            return Err(Error::adapter("edge", format!("reload failed: {output}")));
        }
        Ok(())
    }

    async fn snippet_exists(&self, site_domain: &str) -> Result<bool> {
        let file_name = Self::snippet_file_name(site_domain);
        let path = format!("{}/{}", self.snippet_dir.trim_end_matches('/'), file_name);
        let (exit_code, _) = self
            .container
            .exec(&self.edge_container_name, &["test".to_string(), "-f".to_string(), path])
            .await?;
        Ok(exit_code == 0)
    }

    async fn snippet_contains(&self, site_domain: &str, needle: &str) -> Result<bool> {
        let file_name = Self::snippet_file_name(site_domain);
        let path = format!("{}/{}", self.snippet_dir.trim_end_matches('/'), file_name);
        let (exit_code, _) = self
            .container
            .exec(&self.edge_container_name, &["grep".to_string(), "-qF".to_string(), needle.to_string(), path])
            .await?;
        Ok(exit_code == 0)
    }

    async fn cert_on_disk(&self, domain: &str) -> Result<bool> {
        let path = format!("{}/{}/{}.crt", self.cert_dir.trim_end_matches('/'), domain, domain);
        let (exit_code, _) = self
            .container
            .exec(&self.edge_container_name, &["test".to_string(), "-f".to_string(), path])
            .await?;
        Ok(exit_code == 0)
    }
}

/// In-memory fake used by orchestrator unit tests.
#[derive(Default)]
pub struct FakeEdge {
    pub snippets: Mutex<HashMap<String, String>>,
    pub certs: Mutex<std::collections::HashSet<String>>,
    pub reload_count: Mutex<u32>,
    pub fail_step: Mutex<Option<String>>,
}

impl FakeEdge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, step: &str) {
        *self.fail_step.lock().unwrap() = Some(step.to_string());
    }

    pub fn mark_cert_issued(&self, domain: &str) {
        self.certs.lock().unwrap().insert(domain.to_string());
    }

    fn maybe_fail(&self, step: &str) -> Result<()> {
        let mut guard = self.fail_step.lock().unwrap();
        if guard.as_deref() == Some(step) {
            *guard = None;
            return Err(Error::adapter("edge", format!("forced failure at {step}")));
        }
        Ok(())
    }
}

#[async_trait]
impl EdgeConfigOps for FakeEdge {
    async fn ensure_snippet_dir(&self) -> Result<()> {
        Ok(())
    }

    async fn write_snippet(&self, site_domain: &str, contents: &str) -> Result<()> {
        self.maybe_fail("write_snippet")?;
        self.snippets.lock().unwrap().insert(site_domain.to_string(), contents.to_string());
        Ok(())
    }

    async fn remove_snippet(&self, site_domain: &str) -> Result<()> {
        self.snippets.lock().unwrap().remove(site_domain);
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.maybe_fail("reload")?;
        *self.reload_count.lock().unwrap() += 1;
        Ok(())
    }

    async fn snippet_exists(&self, site_domain: &str) -> Result<bool> {
        Ok(self.snippets.lock().unwrap().contains_key(site_domain))
    }

    async fn snippet_contains(&self, site_domain: &str, needle: &str) -> Result<bool> {
        Ok(self
            .snippets
            .lock()
            .unwrap()
            .get(site_domain)
            .map(|contents| contents.contains(needle))
            .unwrap_or(false))
    }

    async fn cert_on_disk(&self, domain: &str) -> Result<bool> {
        Ok(self.certs.lock().unwrap().contains(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_edge_round_trips_a_snippet() {
        let edge = FakeEdge::new();
        assert!(!edge.snippet_exists("mysite.wpfleet.example").await.unwrap());
        edge.write_snippet("mysite.wpfleet.example", "route { ... }").await.unwrap();
        assert!(edge.snippet_exists("mysite.wpfleet.example").await.unwrap());
        edge.remove_snippet("mysite.wpfleet.example").await.unwrap();
        assert!(!edge.snippet_exists("mysite.wpfleet.example").await.unwrap());
    }

    #[tokio::test]
    async fn fake_edge_tracks_reload_count() {
        let edge = FakeEdge::new();
        edge.reload().await.unwrap();
        edge.reload().await.unwrap();
        assert_eq!(*edge.reload_count.lock().unwrap(), 2);
    }
}
