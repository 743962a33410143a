use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

use hearth_guard::auth::CredentialHasher;
use hearth_guard::config::{load_config, GuardConfig};
use hearth_guard::security::origin::OriginValidator;
use hearth_guard::security::scanner::ThreatScanner;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Operator CLI for the Hearth & Flame API guard", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a password with the configured Argon2 parameters
    HashPassword { password: String },
    /// Run the full threat scan over a JSON document
    Scan { file: PathBuf },
    /// Check an origin against the configured allowlist
    CheckOrigin { origin: String },
    /// Log in against a running guard and print the token pair
    Login {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    match cli.command {
        Commands::HashPassword { password } => {
            let hasher = CredentialHasher::new(&config.auth)?;
            println!("{}", hasher.hash(&password)?);
        }
        Commands::Scan { file } => {
            let content = std::fs::read_to_string(&file)?;
            let payload: Value = serde_json::from_str(&content)?;
            let scanner = ThreatScanner::full(config.scanner.max_depth);
            match scanner.scan("body", &payload) {
                Ok(()) => println!("clean"),
                Err(threat) => {
                    println!("malicious: {}", threat);
                    std::process::exit(1);
                }
            }
        }
        Commands::CheckOrigin { origin } => {
            let validator = OriginValidator::from_config(&config.cors, config.environment);
            if validator.is_allowed(Some(&origin)) {
                println!("allowed");
            } else {
                println!("rejected");
                std::process::exit(1);
            }
        }
        Commands::Login {
            url,
            email,
            password,
        } => {
            let client = reqwest::Client::new();
            let res = client
                .post(format!("{}/api/auth/login", url))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: guard returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
