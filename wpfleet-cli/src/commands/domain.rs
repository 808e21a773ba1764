use anyhow::Result;
use colored::*;

use crate::client::ApiClient;

pub async fn set(client: &ApiClient, site_id: &str, domain: &str) -> Result<()> {
    let response = client.attach_domain(site_id, domain).await?;
    println!("{} domain attach requested for '{}' -> '{}'", "✓".green(), site_id, domain);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub async fn remove(client: &ApiClient, site_id: &str) -> Result<()> {
    let site = client.detach_domain(site_id).await?;
    println!("{} custom domain removed from '{}'", "✓".green(), site_id);
    println!("{}", serde_json::to_string_pretty(&site)?);
    Ok(())
}

pub async fn cert_retry(client: &ApiClient, site_id: &str) -> Result<()> {
    let response = client.cert_retry(site_id).await?;
    println!("{} certificate retry requested for '{}'", "✓".green(), site_id);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
