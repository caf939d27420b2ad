//! OBEX server CLI binary.
//!
//! # Commands
//!
//! - `serve` - Serve Object Push or File Transfer over TCP
//! - `config` - Print the effective configuration
//! - `parse-time` - Parse a TIME header value

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use obex::{
    codec::{format_iso8601, parse_iso8601},
    config::Config,
    protocol::ServiceKind,
    server::Server,
    VERSION,
};

#[derive(Parser)]
#[command(name = "obexd")]
#[command(version = VERSION)]
#[command(about = "OBEX server - Object Push and File Transfer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept connections and serve a profile
    Serve {
        /// Config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind to all interfaces
        #[arg(long)]
        bind_all: bool,

        /// Profile to serve (opp, ftp)
        #[arg(short, long)]
        service: Option<ServiceKind>,

        /// Root folder
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Business card served by Object Push
        #[arg(long)]
        vcard: Option<PathBuf>,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Log as JSON lines
        #[arg(long)]
        json_logs: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Parse a TIME header value (YYYYMMDDTHHMMSS[Z]); prints -1 when invalid
    ParseTime {
        /// Value to parse
        value: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            bind_all,
            service,
            root,
            vcard,
            verbose,
            json_logs,
        } => {
            let mut config = load_config(config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if bind_all {
                config.server.host = "0.0.0.0".to_string();
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(service) = service {
                config.server.service = service;
            }
            if let Some(root) = root {
                config.server.root = root;
            }
            if let Some(vcard) = vcard {
                config.server.vcard = vcard;
            }
            cmd_serve(config, verbose, json_logs)
        },

        Commands::Config { config } => {
            let config = load_config(config)?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },

        Commands::ParseTime { value } => cmd_parse_time(&value),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let base = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    Ok(base.merge(Config::from_env()))
}

fn cmd_serve(config: Config, verbose: bool, json_logs: bool) -> anyhow::Result<()> {
    // Initialize logging
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let server_config = config.to_server_config()?;
    if !server_config.root.is_dir() {
        anyhow::bail!("Root folder {} does not exist", server_config.root.display());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let server = Server::bind(server_config).await?;
        server.run().await?;
        Ok::<_, anyhow::Error>(())
    })
}

fn cmd_parse_time(value: &str) -> anyhow::Result<()> {
    match parse_iso8601(value.as_bytes()) {
        Some(time) => {
            println!("{time}");
            if let Some(utc) = format_iso8601(time) {
                println!("{utc}");
            }
            Ok(())
        },
        None => {
            // Same sentinel the TIME header decoder reports
            println!("-1");
            Ok(())
        },
    }
}
