//! Site lifecycle endpoints: provision, static-provision,
//! destroy, list, get (with live-infra probes), hard delete.

use crate::adapters::ContainerStatus;
use crate::error::{ApiError, Result};
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wpfleet_core::models::{JobType, Site, SiteStatus};
use wpfleet_core::{lifecycle, naming, Error as CoreError};

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub site_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub site: Site,
    pub job_id: String,
}

/// `POST /api/provision`
pub async fn provision(
    State(state): State<AppState>,
    Json(body): Json<ProvisionRequest>,
) -> Result<Json<ProvisionResponse>> {
    if !lifecycle::is_valid_site_name(&body.site_id) {
        return Err(ApiError(CoreError::Validation(format!(
            "'{}' is not a valid site identifier",
            body.site_id
        ))));
    }

    let site = match state.store.get_site(&body.site_id).await {
        Ok(existing) => {
            if state.store.has_active_job(&existing.id).await? {
                return Err(ApiError(CoreError::Conflict(format!(
                    "site '{}' already has an in-flight job",
                    existing.id
                ))));
            }
            if existing.status != SiteStatus::Failed {
                return Err(ApiError(CoreError::Conflict(format!(
                    "site '{}' cannot be (re-)provisioned from status {}",
                    existing.id, existing.status
                ))));
            }
            state
                .store
                .transition_site(&existing.id, SiteStatus::Provisioning)
                .await?
        }
        Err(CoreError::SiteNotFound(_)) => {
            let domain = naming::default_domain(&body.site_id, &state.config.base_domain);
            let site = state
                .store
                .upsert_site(&body.site_id, &domain, SiteStatus::Created, None)
                .await?;
            state
                .store
                .transition_site(&site.id, SiteStatus::Provisioning)
                .await?
        }
        Err(other) => return Err(ApiError(other)),
    };

    let job = state
        .store
        .insert_job(JobType::Provision, &site.id, None)
        .await?;
    state.store.set_site_job(&site.id, Some(&job.id)).await?;

    Ok(Json(ProvisionResponse { site, job_id: job.id }))
}

#[derive(Debug, Serialize)]
pub struct StaticProvisionResponse {
    pub site: Site,
    pub job_id: String,
}

/// `POST /api/static/provision` — multipart form with a `site` text field
/// and a `zip` file field holding the staged static archive.
pub async fn static_provision(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StaticProvisionResponse>> {
    let mut site_id: Option<String> = None;
    let mut zip_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(CoreError::Validation(format!("malformed multipart body: {e}"))))?
    {
        match field.name() {
            Some("site") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError(CoreError::Validation(format!("invalid site field: {e}"))))?;
                site_id = Some(text);
            }
            Some("zip") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError(CoreError::Validation(format!("invalid zip field: {e}"))))?;
                zip_bytes = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let site_id = site_id.ok_or_else(|| ApiError(CoreError::Validation("missing 'site' field".into())))?;
    let zip_bytes =
        zip_bytes.ok_or_else(|| ApiError(CoreError::Validation("missing 'zip' field".into())))?;

    if !lifecycle::is_valid_site_name(&site_id) {
        return Err(ApiError(CoreError::Validation(format!(
            "'{site_id}' is not a valid site identifier"
        ))));
    }

    let site = match state.store.get_site(&site_id).await {
        Ok(existing) => {
            if state.store.has_active_job(&existing.id).await? {
                return Err(ApiError(CoreError::Conflict(format!(
                    "site '{}' already has an in-flight job",
                    existing.id
                ))));
            }
            if existing.status != SiteStatus::Failed {
                return Err(ApiError(CoreError::Conflict(format!(
                    "site '{}' cannot be (re-)provisioned from status {}",
                    existing.id, existing.status
                ))));
            }
            state
                .store
                .transition_site(&existing.id, SiteStatus::Provisioning)
                .await?
        }
        Err(CoreError::SiteNotFound(_)) => {
            let domain = naming::default_domain(&site_id, &state.config.base_domain);
            let site = state
                .store
                .upsert_site(&site_id, &domain, SiteStatus::Created, None)
                .await?;
            state
                .store
                .transition_site(&site.id, SiteStatus::Provisioning)
                .await?
        }
        Err(other) => return Err(ApiError(other)),
    };

    let staged_path = std::env::temp_dir().join(format!("wpfleet-static-{}.zip", Uuid::new_v4()));
    std::fs::write(&staged_path, &zip_bytes)
        .map_err(|e| ApiError(CoreError::adapter("static_provision", e)))?;

    let payload = staged_path.to_string_lossy().to_string();
    let job = state
        .store
        .insert_job(JobType::StaticProvision, &site.id, Some(&payload))
        .await?;
    state.store.set_site_job(&site.id, Some(&job.id)).await?;

    Ok(Json(StaticProvisionResponse { site, job_id: job.id }))
}

#[derive(Debug, Deserialize)]
pub struct DestroyRequest {
    pub site_id: String,
}

#[derive(Debug, Serialize)]
pub struct DestroyResponse {
    pub site: Site,
    pub job_id: String,
}

/// `POST /api/destroy`
pub async fn destroy(
    State(state): State<AppState>,
    Json(body): Json<DestroyRequest>,
) -> Result<Json<DestroyResponse>> {
    let site = state.store.get_site(&body.site_id).await?;
    if !lifecycle::allows_destroy(site.status) {
        return Err(ApiError(CoreError::Conflict(format!(
            "site '{}' cannot be destroyed from status {}",
            site.id, site.status
        ))));
    }
    if state.store.has_active_job(&site.id).await? {
        return Err(ApiError(CoreError::Conflict(format!(
            "site '{}' already has an in-flight job",
            site.id
        ))));
    }

    let site = state
        .store
        .transition_site(&site.id, SiteStatus::Destroying)
        .await?;
    let job = state
        .store
        .insert_job(JobType::Destroy, &site.id, None)
        .await?;
    state.store.set_site_job(&site.id, Some(&job.id)).await?;

    Ok(Json(DestroyResponse { site, job_id: job.id }))
}

/// `GET /api/sites`
pub async fn list_sites(State(state): State<AppState>) -> Result<Json<Vec<Site>>> {
    Ok(Json(state.store.list_sites().await?))
}

#[derive(Debug, Serialize)]
pub struct SiteDetailResponse {
    #[serde(flatten)]
    pub site: Site,
    pub app_container_status: String,
    pub sidecar_container_status: String,
    pub snippet_exists: bool,
    pub cert_on_disk: bool,
    pub warnings: Vec<String>,
}

/// `GET /api/sites/:site` — durable record plus a best-effort probe of the
/// live infrastructure, surfacing any drift as `warnings` rather than
/// failing the request.
pub async fn get_site(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<SiteDetailResponse>> {
    let site = state.store.get_site(&site_id).await?;

    let mut warnings = Vec::new();

    let app_container = naming::app_container_name(&site_id);
    let app_status = state
        .container
        .inspect_status(&app_container)
        .await
        .unwrap_or(ContainerStatus::Missing);

    let sidecar_container = naming::sidecar_container_name(&site_id);
    let sidecar_status = state
        .container
        .inspect_status(&sidecar_container)
        .await
        .unwrap_or(ContainerStatus::Missing);

    let snippet_exists = state.edge.snippet_exists(&site_id).await.unwrap_or(false);
    let cert_on_disk = state
        .edge
        .cert_on_disk(site.custom_domain.as_deref().unwrap_or(&site.domain))
        .await
        .unwrap_or(false);

    if matches!(site.status, SiteStatus::Active | SiteStatus::DomainActive) {
        if app_status != ContainerStatus::Running {
            warnings.push(format!("app container '{app_container}' is not running"));
        }
        if sidecar_status != ContainerStatus::Running {
            warnings.push(format!("sidecar container '{sidecar_container}' is not running"));
        }
        if !snippet_exists {
            warnings.push("edge router snippet is missing for an active site".to_string());
        }
    }

    Ok(Json(SiteDetailResponse {
        site,
        app_container_status: format!("{app_status:?}"),
        sidecar_container_status: format!("{sidecar_status:?}"),
        snippet_exists,
        cert_on_disk,
        warnings,
    }))
}

/// `DELETE /api/sites/:site` — hard delete, gated on `DESTROYED`.
pub async fn hard_delete_site(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.store.hard_delete_site(&site_id).await?;
    Ok(Json(serde_json::json!({ "deleted": site_id })))
}
