use anyhow::Result;

use crate::client::ApiClient;

pub async fn get(client: &ApiClient, job_id: &str) -> Result<()> {
    let job = client.get_job(job_id).await?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
