use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The eleven lifecycle states a site moves through. See
/// [`crate::lifecycle`] for the transition matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Created,
    Provisioning,
    Active,
    DomainPending,
    DomainValidating,
    DomainRouting,
    DomainActive,
    DomainRemoving,
    Destroying,
    Destroyed,
    Failed,
}

impl SiteStatus {
    pub const ALL: [SiteStatus; 11] = [
        SiteStatus::Created,
        SiteStatus::Provisioning,
        SiteStatus::Active,
        SiteStatus::DomainPending,
        SiteStatus::DomainValidating,
        SiteStatus::DomainRouting,
        SiteStatus::DomainActive,
        SiteStatus::DomainRemoving,
        SiteStatus::Destroying,
        SiteStatus::Destroyed,
        SiteStatus::Failed,
    ];
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", s.as_str().unwrap_or("UNKNOWN"))
    }
}

/// A tenant whose runtime is materialized by this controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub domain: String,
    pub custom_domain: Option<String>,
    pub status: SiteStatus,
    pub job_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
