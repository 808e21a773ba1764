//! Custom-domain attach / detach: a synchronous transaction gated by
//! format, DNS, and uniqueness guards, then infra-first / DB-last steps
//! with partial compensation.

use crate::adapters::container::ContainerOps;
use crate::adapters::{AppDbOps, EdgeConfigOps};
use crate::store::Store;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{error, info, warn};
use wpfleet_core::models::{Site, SiteStatus};
use wpfleet_core::{lifecycle, naming, Error, Result};
use wpfleet_network::dns::DnsResolve;

use super::{sidecar_server_block, wordpress_edge_snippet};

/// What happened as a result of an attach/detach call, for the handler to
/// translate into the right HTTP response.
#[derive(Debug)]
pub enum AttachOutcome {
    Applied(Site),
    AlreadySet(Site),
    AppliedButNotPersisted { domain: String },
}

pub struct DomainManager {
    container: Arc<dyn ContainerOps>,
    edge: Arc<dyn EdgeConfigOps>,
    appdb: Arc<dyn AppDbOps>,
    dns: Arc<dyn DnsResolve>,
    store: Arc<Store>,
    base_domain: String,
    public_ip: Ipv4Addr,
}

impl DomainManager {
    pub fn new(
        container: Arc<dyn ContainerOps>,
        edge: Arc<dyn EdgeConfigOps>,
        appdb: Arc<dyn AppDbOps>,
        dns: Arc<dyn DnsResolve>,
        store: Arc<Store>,
        base_domain: String,
        public_ip: Ipv4Addr,
    ) -> Self {
        Self {
            container,
            edge,
            appdb,
            dns,
            store,
            base_domain,
            public_ip,
        }
    }

    pub async fn attach(&self, site_id: &str, requested_domain: &str) -> Result<AttachOutcome> {
        let site = self.store.get_site(site_id).await?;

        if site.custom_domain.as_deref() == Some(requested_domain) {
            return Ok(AttachOutcome::AlreadySet(site));
        }

        lifecycle::validate_domain_format(requested_domain, &self.base_domain)
            .map_err(Error::Validation)?;

        if !lifecycle::allows_custom_domain(site.status) {
            return Err(Error::Conflict(format!(
                "site '{site_id}' must be ACTIVE or DOMAIN_ACTIVE to attach a domain (currently {})",
                site.status
            )));
        }

        let resolved = self
            .dns
            .lookup_a(requested_domain)
            .await
            .map_err(|e| Error::adapter("dns", e))?;
        if !resolved.contains(&self.public_ip) {
            return Err(Error::Validation(format!(
                "'{requested_domain}' does not resolve to the expected ingress IP {}",
                self.public_ip
            )));
        }

        self.store.ensure_domain_available(requested_domain, site_id).await?;

        let app_container = naming::app_container_name(site_id);
        let sidecar_container = naming::sidecar_container_name(site_id);
        let domains = vec![site.domain.clone(), requested_domain.to_string()];

        self.store.transition_site(site_id, SiteStatus::DomainPending).await?;
        self.store.transition_site(site_id, SiteStatus::DomainValidating).await?;

        // Step 1: rewrite the sidecar to serve both hostnames.
        let block = sidecar_server_block(&app_container, &domains);
        if let Err(err) = self.rewrite_sidecar(&sidecar_container, &block).await {
            // Nothing downstream has been touched yet; revert the in-flight
            // transition and surface the failure.
            let _ = self.store.transition_site(site_id, SiteStatus::Active).await;
            return Err(err);
        }

        // Step 2: rewrite + reload the edge snippet with both hostnames.
        let snippet = wordpress_edge_snippet(&sidecar_container, &domains);
        if let Err(err) = self.rewrite_edge(site_id, &snippet).await {
            // Compensate step 1: revert the sidecar to the default-only block.
            let reverted = sidecar_server_block(&app_container, &[site.domain.clone()]);
            if let Err(e) = self.rewrite_sidecar(&sidecar_container, &reverted).await {
                error!(error = %e, "compensation: failed to revert sidecar after edge rewrite failure");
            }
            let _ = self.store.transition_site(site_id, SiteStatus::Active).await;
            return Err(err);
        }

        self.store.transition_site(site_id, SiteStatus::DomainRouting).await?;

        // Step 3 (non-fatal): update application URL records.
        let db_name = naming::db_name(site_id);
        if let Err(e) = self
            .appdb
            .update_site_urls(&db_name, &format!("https://{requested_domain}"))
            .await
        {
            warn!(site_id, error = %e, "application URL update failed, continuing (non-fatal)");
        }

        self.store.transition_site(site_id, SiteStatus::DomainActive).await?;

        // Step 4: commit the custom domain.
        match self.store.set_custom_domain(site_id, Some(requested_domain)).await {
            Ok(site) => Ok(AttachOutcome::Applied(site)),
            Err(err) => {
                error!(
                    site_id,
                    domain = requested_domain,
                    error = %err,
                    "CRITICAL: domain applied to infra but not persisted to the state store"
                );
                Ok(AttachOutcome::AppliedButNotPersisted {
                    domain: requested_domain.to_string(),
                })
            }
        }
    }

    pub async fn detach(&self, site_id: &str) -> Result<Site> {
        let site = self.store.get_site(site_id).await?;

        let Some(_current) = site.custom_domain.clone() else {
            return Ok(site);
        };

        if site.status != SiteStatus::DomainActive {
            return Err(Error::Conflict(format!(
                "site '{site_id}' has no active custom domain to remove (status {})",
                site.status
            )));
        }

        let app_container = naming::app_container_name(site_id);
        let sidecar_container = naming::sidecar_container_name(site_id);
        let domains = vec![site.domain.clone()];

        self.store.transition_site(site_id, SiteStatus::DomainRemoving).await?;

        let block = sidecar_server_block(&app_container, &domains);
        self.rewrite_sidecar(&sidecar_container, &block).await?;

        let snippet = wordpress_edge_snippet(&sidecar_container, &domains);
        self.rewrite_edge(site_id, &snippet).await?;

        let db_name = naming::db_name(site_id);
        if let Err(e) = self.appdb.update_site_urls(&db_name, &format!("https://{}", site.domain)).await {
            warn!(site_id, error = %e, "application URL revert failed, continuing (non-fatal)");
        }

        self.store.transition_site(site_id, SiteStatus::Active).await?;
        self.store.set_custom_domain(site_id, None).await
    }

    async fn rewrite_sidecar(&self, sidecar_container: &str, block: &str) -> Result<()> {
        let tar_bytes = build_tar("default.conf", block)?;
        self.container
            .copy_tar(sidecar_container, "/etc/nginx/conf.d", tar_bytes)
            .await?;
        let (exit_code, output) = self
            .container
            .exec(sidecar_container, &["nginx".to_string(), "-s".to_string(), "reload".to_string()])
            .await?;
        if exit_code != 0 {
            return Err(Error::adapter("domain", format!("sidecar reload failed: {output}")));
        }
        Ok(())
    }

    async fn rewrite_edge(&self, site_id: &str, snippet: &str) -> Result<()> {
        self.edge.write_snippet(site_id, snippet).await?;
        self.edge.reload().await?;
        info!(site_id, "edge router reloaded for domain change");
        Ok(())
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
        .map_err(|e| Error::adapter("domain", e))?;
    builder.into_inner().map_err(|e| Error::adapter("domain", e))
}
