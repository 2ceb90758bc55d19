use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Operator CLI for the print proxy", long_about = None)]
struct Cli {
    /// Base URL of a running proxy.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Proxy liveness
    Health,
    /// Process and proxy state
    Status,
    /// Probe the print server through the proxy
    TestConnection,
    /// Summary of the TLS credential in use
    CertInfo,
    /// Save the proxy's public certificate
    DownloadCert {
        #[arg(short, long, default_value = "server.crt")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let path = match &cli.command {
        Commands::Health => "/proxy-health",
        Commands::Status => "/status",
        Commands::TestConnection => "/test-connection",
        Commands::CertInfo => "/cert-info",
        Commands::DownloadCert { .. } => "/download-cert",
    };
    let res = client.get(format!("{}{}", base, path)).send().await?;

    match cli.command {
        Commands::DownloadCert { output } => save_certificate(res, &output).await?,
        _ => print_response(res).await?,
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{}", rendered);
    } else {
        eprintln!("Error: proxy returned status {}", status);
        eprintln!("{}", rendered);
        std::process::exit(1);
    }
    Ok(())
}

async fn save_certificate(res: reqwest::Response, output: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        return print_response(res).await;
    }
    let bytes = res.bytes().await?;
    tokio::fs::write(output, &bytes).await?;
    println!("Saved {} bytes to {}", bytes.len(), output.display());
    Ok(())
}
