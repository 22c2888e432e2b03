use clap::Subcommand;
use serde_json::json;

use crate::auth::{generate_jwt, validate_jwt, Claims};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Mint a root token signed with SECURITY_JWT_SECRET")]
    Token {
        #[arg(long, default_value = "operator", help = "Subject recorded in the token")]
        subject: String,
        #[arg(long, help = "Lifetime in hours (defaults to SECURITY_JWT_EXPIRY_HOURS)")]
        hours: Option<u64>,
    },

    #[command(about = "Decode and verify a token")]
    Verify {
        #[arg(help = "JWT to verify")]
        token: String,
    },
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let security = &config().security;

    match cmd {
        AuthCommands::Token { subject, hours } => {
            let claims = Claims::root(subject, hours.unwrap_or(security.jwt_expiry_hours));
            let token = generate_jwt(&claims, &security.jwt_secret)?;

            match output_format {
                OutputFormat::Json => output_success(
                    &output_format,
                    "Root token generated",
                    Some(json!({ "token": token, "claims": claims })),
                ),
                OutputFormat::Text => {
                    println!("{}", token);
                    Ok(())
                }
            }
        }
        AuthCommands::Verify { token } => {
            let claims = validate_jwt(&token, &security.jwt_secret)?;
            output_success(
                &output_format,
                &format!("Token valid for '{}' with '{}' access", claims.sub, claims.access),
                Some(json!({ "claims": claims })),
            )
        }
    }
}
