use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use taskboard_session::client::SignupRequest;
use taskboard_session::transport::ApiResponse;
use taskboard_session::utils;
use taskboard_session::{ClientConfig, RecordingNavigator, SessionClient};

#[derive(Parser)]
#[command(name = "taskboard", version, about = "Taskboard session client")]
struct AppCli {
    /// Config file path
    #[arg(short, long, default_value = "taskboard.json", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and open the role's dashboard
    Login {
        email: String,
        #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Resume the stored session
    Restore,
    /// Clear the stored session
    Logout,
    /// Create an account
    Signup {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        email: String,
        #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Request a password reset email
    ForgotPassword { email: String },
    /// Set a new password with a reset token
    ResetPassword {
        token: String,
        #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the current user
    Whoami,
    /// Show what the credential store holds
    Status,
    /// Ask the admission guard whether a route may be entered
    Enter { path: String },
    /// Authorized GET against the API
    Get { path: String },
    /// Authorized POST with a JSON body
    Post { path: String, body: String },
}

fn print_response(resp: &ApiResponse) {
    let body = serde_json::from_str::<serde_json::Value>(&resp.body)
        .unwrap_or_else(|_| json!(resp.body));
    println!(
        "{}",
        json!({ "status": resp.status.as_u16(), "body": body })
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::logging::init();

    let args = AppCli::parse();
    let config = ClientConfig::load(&args.config)?;
    let navigator = Arc::new(RecordingNavigator::new());
    let client = SessionClient::from_config(&config, navigator.clone())?;

    info!(api_url = %config.api_url, "taskboard client ready");

    let outcome: Result<()> = async {
        match args.command {
            Commands::Login { email, password } => {
                let destination = client.login(&email, &password).await?;
                println!("{}", serde_json::to_string_pretty(&destination)?);
            }
            Commands::Restore => {
                let destination = client.restore().await?;
                println!("{}", serde_json::to_string_pretty(&destination)?);
            }
            Commands::Logout => client.logout(),
            Commands::Signup {
                first_name,
                last_name,
                email,
                password,
            } => {
                let resp = client
                    .signup(&SignupRequest {
                        first_name,
                        last_name,
                        email,
                        password,
                    })
                    .await?;
                print_response(&resp);
            }
            Commands::ForgotPassword { email } => {
                print_response(&client.forgot_password(&email).await?);
            }
            Commands::ResetPassword { token, password } => {
                print_response(&client.reset_password(&token, &password).await?);
            }
            Commands::Whoami => {
                let user = client.current_user().await?;
                println!("{}", serde_json::to_string_pretty(&user)?);
            }
            Commands::Status => {
                let store = client.store();
                let credential = store.snapshot();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "authenticated": credential.access_token.is_some(),
                        "has_refresh_token": credential.refresh_token.is_some(),
                        "role": credential.role,
                        "token_age_secs": store.token_age_seconds(),
                        "last_rotated": store.last_rotated(),
                    }))?
                );
            }
            Commands::Enter { path } => {
                let allowed = client.can_enter(&path).await;
                println!("{}", json!({ "route": path, "allowed": allowed }));
            }
            Commands::Get { path } => {
                print_response(&client.authorizer().get(&path).await?);
            }
            Commands::Post { path, body } => {
                let body = serde_json::from_str(&body).context("parsing request body JSON")?;
                print_response(&client.authorizer().post(&path, body).await?);
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Some(navigation) = navigator.last() {
        eprintln!("-> {navigation}");
    }
    outcome
}
