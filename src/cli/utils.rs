use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });
            if let Some(data) = data {
                response["data"] = data;
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an empty collection in the appropriate format
pub fn output_empty_collection(output_format: &OutputFormat, collection_name: &str, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ collection_name: [] }))?);
        }
        OutputFormat::Text => {
            println!("{}", message);
        }
    }
    Ok(())
}

fn text(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

fn joined(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "-".to_string())
}

pub fn output_tenants(output_format: &OutputFormat, tenants: &[Value]) -> anyhow::Result<()> {
    if tenants.is_empty() {
        return output_empty_collection(output_format, "tenants", "No tenants registered");
    }

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "tenants": tenants }))?);
        }
        OutputFormat::Text => {
            println!("{:<20} {:<25} {:<10} {:<25} {}", "SLUG", "DISPLAY NAME", "STATUS", "DOMAIN", "FEATURES");
            println!("{}", "-".repeat(100));
            for tenant in tenants {
                println!(
                    "{:<20} {:<25} {:<10} {:<25} {}",
                    text(tenant, "slug"),
                    text(tenant, "display_name"),
                    text(tenant, "status"),
                    text(tenant, "domain"),
                    joined(tenant, "features")
                );
            }
        }
    }
    Ok(())
}

pub fn output_tenant(output_format: &OutputFormat, tenant: &Value) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "tenant": tenant }))?);
        }
        OutputFormat::Text => {
            println!("Slug:         {}", text(tenant, "slug"));
            println!("ID:           {}", text(tenant, "id"));
            println!("Display name: {}", text(tenant, "display_name"));
            println!("Status:       {}", text(tenant, "status"));
            println!("Domain:       {}", text(tenant, "domain"));
            println!("Features:     {}", joined(tenant, "features"));
            if let Some(limits) = tenant.get("limits").and_then(Value::as_object) {
                for (resource, max) in limits {
                    println!("Limit:        {} <= {}", resource, max);
                }
            }
            println!("Updated:      {}", text(tenant, "updated_at"));
        }
    }
    Ok(())
}

pub fn output_usage(output_format: &OutputFormat, slug: &str, usage: &[Value]) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "tenant": slug, "usage": usage }))?);
        }
        OutputFormat::Text => {
            println!("Usage for {}", slug);
            println!("{:<20} {:>10} {:>10}", "RESOURCE", "CURRENT", "MAX");
            println!("{}", "-".repeat(42));
            for entry in usage {
                let max = match entry.get("max") {
                    Some(Value::Number(n)) => n.to_string(),
                    _ => "unlimited".to_string(),
                };
                println!("{:<20} {:>10} {:>10}", text(entry, "resource"), text(entry, "current"), max);
            }
        }
    }
    Ok(())
}

/// Parses `kind=max` pairs from the command line
pub fn parse_limits(pairs: &[String]) -> anyhow::Result<Value> {
    let mut limits = serde_json::Map::new();
    for pair in pairs {
        let (resource, max) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Limit '{}' must look like resource=max", pair))?;
        let max: i64 = max
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Limit '{}' has a non-numeric maximum", pair))?;
        limits.insert(resource.trim().replace('-', "_"), json!(max));
    }
    Ok(Value::Object(limits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_limit_pairs() {
        let limits = parse_limits(&["users=10".to_string(), "training-courses=2".to_string()]).unwrap();
        assert_eq!(limits, json!({ "users": 10, "training_courses": 2 }));

        assert!(parse_limits(&["users".to_string()]).is_err());
        assert!(parse_limits(&["users=many".to_string()]).is_err());
    }
}
