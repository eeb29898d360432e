//! Process configuration, loaded once at startup and passed down
//! explicitly, no ambient globals.
use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub ledger_url: String,
    pub signer_key: String,
    pub db_path: PathBuf,
    pub confirm_timeout: Duration,
    pub max_submit_retries: u32,
}

impl Config {
    /// Read configuration from the environment. `RPC_URL` and
    /// `PRIVATE_KEY` are required, everything else has a default.
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = match std::env::var("PORT") {
            Ok(raw) => raw.parse().context("PORT is not a valid port number")?,
            Err(_) => 5000,
        };
        let ledger_url =
            std::env::var("RPC_URL").context("RPC_URL not found in environment variables")?;
        let signer_key = std::env::var("PRIVATE_KEY")
            .context("PRIVATE_KEY not found in environment variables")?;
        let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "trade_anchor_db".into());
        let confirm_timeout = std::env::var("CONFIRM_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(60);
        let max_submit_retries = std::env::var("MAX_SUBMIT_RETRIES")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(3);

        Ok(Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ledger_url,
            signer_key,
            db_path: PathBuf::from(db_path),
            confirm_timeout: Duration::from_secs(confirm_timeout),
            max_submit_retries,
        })
    }
}
