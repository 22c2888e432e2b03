use clap::Subcommand;
use serde_json::Value;

use crate::cli::client::ApiClient;
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Check server health status from API /health endpoint")]
    Health,

    #[command(about = "Show server information from API root endpoint")]
    Info,

    #[command(about = "Drop the server's cached tenant registry")]
    Invalidate,
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = ApiClient::from_env()?;

    match cmd {
        ServerCommands::Health => {
            let health = client.get("/health").await?;
            let status = health.get("status").and_then(Value::as_str).unwrap_or("unknown");
            output_success(
                &output_format,
                &format!("{} is {}", client.base_url(), status),
                Some(health),
            )
        }
        ServerCommands::Info => {
            let info = client.get("/").await?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
                OutputFormat::Text => {
                    let field = |key: &str| info.get(key).and_then(Value::as_str).unwrap_or("-").to_string();
                    println!("Server:        {}", client.base_url());
                    println!("Name:          {}", field("name"));
                    println!("Version:       {}", field("version"));
                    println!("Tenant header: {}", field("tenant_header"));
                }
            }
            Ok(())
        }
        ServerCommands::Invalidate => {
            client.post("/api/root/cache/invalidate", None).await?;
            output_success(&output_format, "Tenant registry cache invalidated", None)
        }
    }
}
