//! Custom-domain attach/detach endpoints.

use crate::error::{ApiError, Result};
use crate::orchestrate::AttachOutcome;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use wpfleet_core::Error as CoreError;

/// How long `CertRetry` polls `cert_on_disk` for before giving up, and the
/// fixed tick between polls.
const CERT_POLL_TOTAL: Duration = Duration::from_secs(30);
const CERT_POLL_TICK: Duration = Duration::from_secs(3);

fn cert_status_str(cert_on_disk: bool) -> &'static str {
    if cert_on_disk {
        "issued"
    } else {
        "pending"
    }
}

#[derive(Debug, Deserialize)]
pub struct AttachDomainRequest {
    pub domain: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "result")]
pub enum AttachDomainResponse {
    Applied { site: wpfleet_core::models::Site },
    AlreadySet { site: wpfleet_core::models::Site },
    AppliedButNotPersisted { domain: String },
}

/// `POST /api/sites/:site/domain`
pub async fn attach_domain(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Json(body): Json<AttachDomainRequest>,
) -> Result<Json<AttachDomainResponse>> {
    let outcome = state.domain_manager.attach(&site_id, &body.domain).await?;
    Ok(Json(match outcome {
        AttachOutcome::Applied(site) => AttachDomainResponse::Applied { site },
        AttachOutcome::AlreadySet(site) => AttachDomainResponse::AlreadySet { site },
        AttachOutcome::AppliedButNotPersisted { domain } => {
            AttachDomainResponse::AppliedButNotPersisted { domain }
        }
    }))
}

/// `DELETE /api/sites/:site/domain`
pub async fn detach_domain(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<wpfleet_core::models::Site>> {
    Ok(Json(state.domain_manager.detach(&site_id).await?))
}

#[derive(Debug, Serialize)]
pub struct DnsStatus {
    pub ok: bool,
    pub resolved: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DomainStatusResponse {
    pub site_id: String,
    pub custom_domain: Option<String>,
    pub domain: Option<String>,
    pub status: String,
    pub expected_ip: String,
    pub dns: DnsStatus,
    pub cert_status: String,
    pub cert_on_disk: bool,
    pub snippet_routes_custom_domain: bool,
    pub ready: bool,
    pub step: String,
}

/// `GET /api/sites/:site/domain/status` — read-only probes of where a
/// custom-domain attach stands: DNS resolution against the public ingress
/// IP, certificate presence, and a `step` classifier a client can poll
/// without re-driving the attach transaction.
pub async fn domain_status(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<DomainStatusResponse>> {
    let site = state.store.get_site(&site_id).await?;
    let expected_ip: std::net::Ipv4Addr = state.config.public_ip.parse().map_err(|_| {
        ApiError(CoreError::InvariantViolation(format!(
            "configured PUBLIC_IP '{}' is not a valid IPv4 address",
            state.config.public_ip
        )))
    })?;

    let (cert_on_disk, snippet_routes_custom_domain, dns) = match &site.custom_domain {
        Some(domain) => {
            let cert = state.edge.cert_on_disk(domain).await.unwrap_or(false);
            let routes = state
                .edge
                .snippet_contains(&site_id, domain)
                .await
                .unwrap_or(false);
            let resolved = state.dns.lookup_a(domain).await.unwrap_or_default();
            let ok = resolved.contains(&expected_ip);
            let dns = DnsStatus {
                ok,
                resolved: resolved.iter().map(ToString::to_string).collect(),
            };
            (cert, routes, dns)
        }
        None => (false, false, DnsStatus { ok: false, resolved: Vec::new() }),
    };

    let cert_status = cert_status_str(cert_on_disk).to_string();
    let step = if !dns.ok {
        "pending_dns"
    } else if cert_status != "issued" {
        "pending_cert"
    } else {
        "active"
    };
    let ready = step == "active";

    Ok(Json(DomainStatusResponse {
        site_id: site.id,
        custom_domain: site.custom_domain.clone(),
        domain: site.custom_domain,
        status: site.status.to_string(),
        expected_ip: expected_ip.to_string(),
        dns,
        cert_status,
        cert_on_disk,
        snippet_routes_custom_domain,
        ready,
        step: step.to_string(),
    }))
}

/// `POST /api/sites/:site/cert-retry` — since TLS issuance itself is out of
/// scope, this re-triggers the edge router's reload to re-queue issuance,
/// then polls the issued-certificate file for up to [`CERT_POLL_TOTAL`] on a
/// [`CERT_POLL_TICK`] cadence, the only operation in this crate that blocks
/// a caller on an external condition rather than returning immediately.
pub async fn cert_retry(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let site = state.store.get_site(&site_id).await?;
    let Some(domain) = site.custom_domain else {
        return Err(ApiError(CoreError::Conflict(format!(
            "site '{site_id}' has no custom domain to retry a certificate for"
        ))));
    };

    state.edge.reload().await?;
    let cert_on_disk = poll_cert_on_disk(&state, &domain).await;

    Ok(Json(serde_json::json!({
        "site_id": site_id,
        "domain": domain,
        "reloaded": true,
        "cert_on_disk": cert_on_disk,
        "cert_status": cert_status_str(cert_on_disk),
    })))
}

/// Polls `edge.cert_on_disk` every [`CERT_POLL_TICK`] until it reports the
/// certificate present or [`CERT_POLL_TOTAL`] elapses, whichever comes
/// first.
async fn poll_cert_on_disk(state: &AppState, domain: &str) -> bool {
    let deadline = tokio::time::Instant::now() + CERT_POLL_TOTAL;
    loop {
        if state.edge.cert_on_disk(domain).await.unwrap_or(false) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(CERT_POLL_TICK).await;
    }
}
