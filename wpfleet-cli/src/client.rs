//! Thin HTTP client for the control-plane API, using the shared-secret
//! `X-API-Key` header the server expects for every protected route.

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde::Serialize;
use wpfleet_core::models::{Job, Site};

use crate::config::Config;

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

        if let Some(key) = &config.api_key {
            headers.insert("x-api-key", header::HeaderValue::from_str(key)?);
        }

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: config.api_url.clone(),
        })
    }

    pub async fn health_check(&self) -> Result<bool> {
        let resp = self.client.get(format!("{}/api/health", self.base_url)).send().await;
        match resp {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    pub async fn provision(&self, site_id: &str) -> Result<serde_json::Value> {
        #[derive(Serialize)]
        struct Req<'a> {
            site_id: &'a str,
        }
        self.client
            .post(format!("{}/api/provision", self.base_url))
            .json(&Req { site_id })
            .send()
            .await
            .context("failed to send provision request")?
            .json()
            .await
            .context("failed to parse provision response")
    }

    pub async fn destroy(&self, site_id: &str) -> Result<serde_json::Value> {
        #[derive(Serialize)]
        struct Req<'a> {
            site_id: &'a str,
        }
        self.client
            .post(format!("{}/api/destroy", self.base_url))
            .json(&Req { site_id })
            .send()
            .await
            .context("failed to send destroy request")?
            .json()
            .await
            .context("failed to parse destroy response")
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        self.client
            .get(format!("{}/api/sites", self.base_url))
            .send()
            .await
            .context("failed to list sites")?
            .json()
            .await
            .context("failed to parse sites response")
    }

    pub async fn get_site(&self, site_id: &str) -> Result<serde_json::Value> {
        self.client
            .get(format!("{}/api/sites/{}", self.base_url, site_id))
            .send()
            .await
            .context("failed to get site")?
            .json()
            .await
            .context("failed to parse site response")
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.client
            .get(format!("{}/api/jobs/{}", self.base_url, job_id))
            .send()
            .await
            .context("failed to get job")?
            .json()
            .await
            .context("failed to parse job response")
    }

    pub async fn attach_domain(&self, site_id: &str, domain: &str) -> Result<serde_json::Value> {
        #[derive(Serialize)]
        struct Req<'a> {
            domain: &'a str,
        }
        self.client
            .post(format!("{}/api/sites/{}/domain", self.base_url, site_id))
            .json(&Req { domain })
            .send()
            .await
            .context("failed to attach domain")?
            .json()
            .await
            .context("failed to parse domain-attach response")
    }

    pub async fn detach_domain(&self, site_id: &str) -> Result<Site> {
        self.client
            .delete(format!("{}/api/sites/{}/domain", self.base_url, site_id))
            .send()
            .await
            .context("failed to detach domain")?
            .json()
            .await
            .context("failed to parse domain-detach response")
    }

    pub async fn cert_retry(&self, site_id: &str) -> Result<serde_json::Value> {
        self.client
            .post(format!("{}/api/sites/{}/cert-retry", self.base_url, site_id))
            .send()
            .await
            .context("failed to request a certificate retry")?
            .json()
            .await
            .context("failed to parse cert-retry response")
    }
}
