use clap::Subcommand;
use serde_json::{json, Map, Value};

use crate::cli::client::ApiClient;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List tenants")]
    List {
        #[arg(long, help = "Only tenants in this status (active, suspended, pending, inactive)")]
        status: Option<String>,
    },

    #[command(about = "Show tenant information")]
    Show {
        #[arg(help = "Tenant slug")]
        slug: String,
    },

    #[command(about = "Create new tenant")]
    Create {
        #[arg(help = "Tenant slug (lowercase letters, digits, hyphens)")]
        slug: String,
        #[arg(long, help = "Display name (defaults to the slug)")]
        name: Option<String>,
        #[arg(long, help = "Custom domain")]
        domain: Option<String>,
        #[arg(long = "feature", help = "Enabled feature (repeatable)")]
        features: Vec<String>,
        #[arg(long = "limit", help = "Quota as resource=max (repeatable)")]
        limits: Vec<String>,
    },

    #[command(about = "Update tenant configuration")]
    Update {
        #[arg(help = "Tenant slug")]
        slug: String,
        #[arg(long, help = "Display name")]
        name: Option<String>,
        #[arg(long, help = "Custom domain")]
        domain: Option<String>,
        #[arg(long, help = "Remove the custom domain", conflicts_with = "domain")]
        clear_domain: bool,
        #[arg(long = "feature", help = "Replace enabled features (repeatable)")]
        features: Option<Vec<String>>,
        #[arg(long = "limit", help = "Replace quotas, resource=max (repeatable)")]
        limits: Option<Vec<String>>,
    },

    #[command(about = "Suspend tenant")]
    Suspend {
        #[arg(help = "Tenant slug")]
        slug: String,
    },

    #[command(about = "Deactivate tenant (records are kept)")]
    Delete {
        #[arg(help = "Tenant slug")]
        slug: String,
    },

    #[command(about = "Reactivate a suspended or inactive tenant")]
    Restore {
        #[arg(help = "Tenant slug")]
        slug: String,
    },

    #[command(about = "Show usage against quotas")]
    Usage {
        #[arg(help = "Tenant slug")]
        slug: String,
    },

    #[command(about = "Recount stored records and reset usage counters")]
    Recount {
        #[arg(help = "Tenant slug")]
        slug: String,
    },
}

fn tenant_path(slug: &str) -> String {
    format!("/api/root/tenant/{}", slug)
}

fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = ApiClient::from_env()?;

    match cmd {
        TenantCommands::List { status } => {
            let path = match status {
                Some(status) => format!("/api/root/tenant?status={}", status),
                None => "/api/root/tenant".to_string(),
            };
            let tenants = as_list(client.get(&path).await?);
            output_tenants(&output_format, &tenants)
        }
        TenantCommands::Show { slug } => {
            let tenant = client.get(&tenant_path(&slug)).await?;
            output_tenant(&output_format, &tenant)
        }
        TenantCommands::Create {
            slug,
            name,
            domain,
            features,
            limits,
        } => {
            let body = json!({
                "display_name": name.unwrap_or_else(|| slug.clone()),
                "slug": slug,
                "domain": domain,
                "features": features,
                "limits": parse_limits(&limits)?,
            });
            let tenant = client.post("/api/root/tenant", Some(body)).await?;
            output_success(
                &output_format,
                &format!("Tenant '{}' created", slug),
                Some(tenant),
            )
        }
        TenantCommands::Update {
            slug,
            name,
            domain,
            clear_domain,
            features,
            limits,
        } => {
            let mut patch = Map::new();
            if let Some(name) = name {
                patch.insert("display_name".to_string(), json!(name));
            }
            if clear_domain {
                patch.insert("domain".to_string(), Value::Null);
            } else if let Some(domain) = domain {
                patch.insert("domain".to_string(), json!(domain));
            }
            if let Some(features) = features {
                patch.insert("features".to_string(), json!(features));
            }
            if let Some(limits) = limits {
                patch.insert("limits".to_string(), parse_limits(&limits)?);
            }
            if patch.is_empty() {
                anyhow::bail!("Nothing to update; pass --name, --domain, --clear-domain, --feature or --limit");
            }

            let tenant = client.patch(&tenant_path(&slug), Value::Object(patch)).await?;
            output_success(&output_format, &format!("Tenant '{}' updated", slug), Some(tenant))
        }
        TenantCommands::Suspend { slug } => {
            let tenant = client.post(&format!("{}/suspend", tenant_path(&slug)), None).await?;
            output_success(&output_format, &format!("Tenant '{}' suspended", slug), Some(tenant))
        }
        TenantCommands::Delete { slug } => {
            let tenant = client.delete(&tenant_path(&slug)).await?;
            output_success(&output_format, &format!("Tenant '{}' deactivated", slug), Some(tenant))
        }
        TenantCommands::Restore { slug } => {
            let tenant = client.put(&tenant_path(&slug)).await?;
            output_success(&output_format, &format!("Tenant '{}' restored", slug), Some(tenant))
        }
        TenantCommands::Usage { slug } => {
            let usage = as_list(client.get(&format!("{}/usage", tenant_path(&slug))).await?);
            output_usage(&output_format, &slug, &usage)
        }
        TenantCommands::Recount { slug } => {
            let usage = as_list(client.post(&format!("{}/recount", tenant_path(&slug)), None).await?);
            output_usage(&output_format, &slug, &usage)
        }
    }
}
