use dotenvy::dotenv;
use eyre::Result;
use serde::Deserialize;
use std::{env, fmt, net::IpAddr};
use tracing::info;

const DEFAULT_ETHERSCAN_URL: &str = "https://api.etherscan.io/api";

#[derive(Clone, Deserialize)]
pub struct Config {
    pub db_path: String,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub etherscan_api_url: String,
    pub etherscan_api_key: Option<String>,
    pub provider_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

// Hand-written so the API key never reaches the logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field("bind_addr", &self.bind_addr)
            .field("port", &self.port)
            .field("etherscan_api_url", &self.etherscan_api_url)
            .field(
                "etherscan_api_key",
                &self.etherscan_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn load() -> Result<Config> {
    dotenv().ok(); // ✅ Load from .env file

    // SQLite graph store path (default: wallet_graph.db)
    let db_path = env::var("DATABASE_URL").unwrap_or_else(|_| "wallet_graph.db".to_string());

    // API bind address and port (default: 127.0.0.1:8080)
    let bind_addr = parsed_or("BIND_ADDR", IpAddr::from([127, 0, 0, 1]));
    let port = parsed_or("PORT", 8080);

    // Chain-data provider; a missing key is reported per request, not here
    let etherscan_api_url =
        env::var("ETHERSCAN_API_URL").unwrap_or_else(|_| DEFAULT_ETHERSCAN_URL.to_string());
    let etherscan_api_key = env::var("ETHERSCAN_API_KEY")
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    let provider_timeout_secs = parsed_or("PROVIDER_TIMEOUT_SECS", 15);

    // Multipart uploads (default: 50 MiB)
    let max_upload_bytes = parsed_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024);

    let cfg = Config {
        db_path,
        bind_addr,
        port,
        etherscan_api_url,
        etherscan_api_key,
        provider_timeout_secs,
        max_upload_bytes,
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}
