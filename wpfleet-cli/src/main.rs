use anyhow::Result;
use clap::{Parser, Subcommand};
use wpfleet_logging::{LogFormat, LoggingConfig};

mod client;
mod commands;
mod config;

use commands::{destroy, domain, jobs, provision, sites};
use config::Config;

#[derive(Parser)]
#[command(name = "wpfleet")]
#[command(about = "Client for the wpfleet multi-tenant hosting control plane", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Control-plane API URL")]
    api_url: Option<String>,

    #[arg(long, global = true, help = "API key")]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a new site
    Provision {
        #[arg(help = "Site identifier")]
        site_id: String,
    },

    /// Destroy a site
    Destroy {
        #[arg(help = "Site identifier")]
        site_id: String,
    },

    /// List all sites
    List,

    /// Show a site's durable record and live-infra status
    Status {
        #[arg(help = "Site identifier")]
        site_id: String,
    },

    /// Inspect a job by ID
    Job {
        #[arg(help = "Job identifier")]
        job_id: String,
    },

    /// Manage a site's custom domain
    Domain {
        #[command(subcommand)]
        action: DomainCommands,
    },
}

#[derive(Subcommand)]
enum DomainCommands {
    /// Attach a custom domain
    Set {
        #[arg(help = "Site identifier")]
        site_id: String,
        #[arg(help = "Custom domain")]
        domain: String,
    },

    /// Remove the custom domain
    Remove {
        #[arg(help = "Site identifier")]
        site_id: String,
    },

    /// Re-trigger edge router certificate acquisition
    CertRetry {
        #[arg(help = "Site identifier")]
        site_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format = if std::env::var("WPFLEET_LOG_JSON").is_ok() {
        LogFormat::Json
    } else {
        LogFormat::Human
    };
    let logging_config = LoggingConfig::from_env("wpfleet-cli")
        .with_format(log_format)
        .with_level("wpfleet_cli=info,wpfleet_logging=warn");

    if std::env::var("WPFLEET_DEBUG").is_ok() {
        wpfleet_logging::init_logging(logging_config)?;
    }

    let mut config = Config::load()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(api_key) = cli.api_key {
        config.api_key = Some(api_key);
    }

    let client = client::ApiClient::new(&config)?;

    match cli.command {
        Commands::Provision { site_id } => provision::handle(&client, &site_id).await?,
        Commands::Destroy { site_id } => destroy::handle(&client, &site_id).await?,
        Commands::List => sites::list(&client).await?,
        Commands::Status { site_id } => sites::status(&client, &site_id).await?,
        Commands::Job { job_id } => jobs::get(&client, &job_id).await?,
        Commands::Domain { action } => match action {
            DomainCommands::Set { site_id, domain: new_domain } => {
                domain::set(&client, &site_id, &new_domain).await?
            }
            DomainCommands::Remove { site_id } => domain::remove(&client, &site_id).await?,
            DomainCommands::CertRetry { site_id } => domain::cert_retry(&client, &site_id).await?,
        },
    }

    Ok(())
}
