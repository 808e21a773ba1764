use anyhow::Result;
use colored::*;

use crate::client::ApiClient;

pub async fn handle(client: &ApiClient, site_id: &str) -> Result<()> {
    let response = client.destroy(site_id).await?;
    println!("{} destroy job queued for '{}'", "✓".green(), site_id);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
