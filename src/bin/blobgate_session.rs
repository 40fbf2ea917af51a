//! CLI entry point for blobgate-session: mint and check session cookies.

use blobgate::auth::{unix_now, SignedCookieGate};
use blobgate::config::{load_config, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blobgate-session", about = "blobgate session cookie tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a signed session cookie as `name=value`
    Mint {
        #[arg(long, default_value = "blobgate.yaml")]
        config: PathBuf,
        #[arg(long)]
        user: String,
        /// Lifetime in seconds; defaults to `auth.session_ttl`
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Check a cookie value and print its user and expiry
    Verify {
        #[arg(long, default_value = "blobgate.yaml")]
        config: PathBuf,
        #[arg(long)]
        cookie: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let rc = match cli.command {
        Commands::Mint { config, user, ttl } => run_mint(config, user, ttl),
        Commands::Verify { config, cookie } => run_verify(config, cookie),
    };
    std::process::exit(rc);
}

fn gate_for(config: &Config) -> SignedCookieGate {
    SignedCookieGate::new(&config.auth.session_secret, &config.auth.cookie_name)
}

fn read_config(path: &PathBuf) -> Option<Config> {
    match load_config(path) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Error: cannot load {}: {e:#}", path.display());
            None
        }
    }
}

fn run_mint(config: PathBuf, user: String, ttl: Option<u64>) -> i32 {
    let Some(config) = read_config(&config) else {
        return 1;
    };
    if user.is_empty() {
        eprintln!("Error: --user must not be empty");
        return 1;
    }
    let ttl = ttl.unwrap_or(config.auth.session_ttl);
    let gate = gate_for(&config);
    println!("{}={}", gate.cookie_name(), gate.mint(&user, unix_now() + ttl));
    0
}

fn run_verify(config: PathBuf, cookie: String) -> i32 {
    let Some(config) = read_config(&config) else {
        return 1;
    };
    let gate = gate_for(&config);
    // Accept both the bare value and `name=value`.
    let value = cookie
        .strip_prefix(&format!("{}=", gate.cookie_name()))
        .unwrap_or(&cookie);
    match gate.verify(value, unix_now()) {
        Ok(session) => {
            println!("user={} expires={}", session.user, session.expires);
            0
        }
        Err(e) => {
            eprintln!("Invalid session: {e}");
            1
        }
    }
}
