use anyhow::Result;
use colored::*;
use tabled::Tabled;

use crate::client::ApiClient;

#[derive(Tabled)]
struct SiteRow {
    #[tabled(rename = "Site")]
    id: String,
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Custom domain")]
    custom_domain: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub async fn list(client: &ApiClient) -> Result<()> {
    let sites = client.list_sites().await?;
    if sites.is_empty() {
        println!("no sites provisioned yet");
        return Ok(());
    }

    let rows: Vec<SiteRow> = sites
        .into_iter()
        .map(|site| SiteRow {
            id: site.id,
            domain: site.domain,
            custom_domain: site.custom_domain.unwrap_or_else(|| "-".to_string()),
            status: colorize_status(&site.status.to_string()),
        })
        .collect();

    println!("{}", tabled::Table::new(rows));
    Ok(())
}

pub async fn status(client: &ApiClient, site_id: &str) -> Result<()> {
    let detail = client.get_site(site_id).await?;
    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}

fn colorize_status(status: &str) -> String {
    match status {
        "ACTIVE" | "DOMAIN_ACTIVE" => status.green().to_string(),
        "FAILED" => status.red().to_string(),
        "DESTROYED" => status.dimmed().to_string(),
        _ => status.yellow().to_string(),
    }
}
