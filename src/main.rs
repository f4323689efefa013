//! Edge authentication gate
//!
//! OAuth2/OIDC authorization-code login in front of a web origin.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use edge_auth_gate::{
    cli::{Cli, Command},
    config::Config,
    gate::cookies::http_date,
    server::Server,
    setup_tracing,
    token::codec,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match &cli.command {
        Some(Command::Inspect { token }) => run_inspect(token),
        Some(Command::Check) => run_check(&cli),
        Some(Command::Serve) | None => run_server(&cli).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> Result<Config, ExitCode> {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return Err(ExitCode::FAILURE);
        }
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host.clone_from(host);
    }
    if let Some(ref origin) = cli.origin {
        config.server.origin_url.clone_from(origin);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return Err(ExitCode::FAILURE);
    }

    Ok(config)
}

/// Run the gate
async fn run_server(cli: &Cli) -> ExitCode {
    let config = match load_config(cli) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gate shutdown complete");
    ExitCode::SUCCESS
}

/// Validate configuration and print a summary
fn run_check(cli: &Cli) -> ExitCode {
    let config = match load_config(cli) {
        Ok(c) => c,
        Err(code) => return code,
    };

    println!("Configuration OK");
    println!("  listen:      {}:{}", config.server.host, config.server.port);
    println!("  origin:      {}", config.server.origin_url);
    println!("  auth domain: {}", config.auth.auth_domain);
    println!("  issuer:      {}", config.auth.issuer);
    println!(
        "  signatures:  {}",
        if config.auth.verify_signature {
            "verified"
        } else {
            "NOT verified (claims only)"
        }
    );
    if config.auth.protected_paths.is_empty() {
        println!("  protected:   (none)");
    }
    for pattern in &config.auth.protected_paths {
        println!("  protected:   {pattern}");
    }
    ExitCode::SUCCESS
}

/// Print a token's header and claims without validating it
fn run_inspect(token: &str) -> ExitCode {
    let decoded = match codec::decode(token) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Cannot decode token: {e}");
            return ExitCode::FAILURE;
        }
    };

    for (label, value) in [("header", &decoded.header), ("payload", &decoded.payload)] {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{label}:\n{json}"),
            Err(e) => {
                eprintln!("Failed to serialize {label}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if let Some(expires) = codec::parse_expiry(token).and_then(http_date) {
        println!("expires: {expires}");
    }
    ExitCode::SUCCESS
}
