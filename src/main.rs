use clap::Parser;
use screenhouse::{config, server};

#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Screenhouse - screener query compiler for ClickHouse
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HTTP server host address
    #[arg(long, default_value = "0.0.0.0")]
    http_host: String,

    /// HTTP server port
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Maximum accepted request body size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    max_body_bytes: usize,

    /// Path to a screener-config YAML (defaults to the built-in
    /// market-data config)
    #[arg(long)]
    config: Option<String>,
}

impl From<Cli> for config::ServerConfig {
    fn from(cli: Cli) -> Self {
        config::ServerConfig {
            http_host: cli.http_host,
            http_port: cli.http_port,
            request_timeout_secs: cli.request_timeout_secs,
            max_body_bytes: cli.max_body_bytes,
            screener_config_path: cli.config,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    println!("\nScreenhouse v{}\n", env!("CARGO_PKG_VERSION"));

    let config: config::ServerConfig = cli.into();
    if let Err(e) = validator::Validate::validate(&config) {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    server::run_with_config(config).await;
}
