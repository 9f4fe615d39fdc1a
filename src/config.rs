use clap::{Parser, ValueEnum};

/// Which backend holds events, stock, coupons and the reconciliation queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    Scylla,
    Memory,
}

/// Storefront order service configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "storefront-orders", about = "Order checkout, cancellation and returns service", long_about = None)]
pub struct ServiceConfig {
    /// HTTP bind address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8080")]
    pub port: u16,

    #[arg(long, env = "STORE_BACKEND", value_enum, default_value = "scylla")]
    pub store: StoreBackend,

    /// Comma-separated Scylla contact points
    #[arg(long, env = "SCYLLA_NODES", value_delimiter = ',', default_value = "127.0.0.1:9042")]
    pub scylla_nodes: Vec<String>,

    #[arg(long, env = "SCYLLA_KEYSPACE", default_value = "storefront")]
    pub keyspace: String,

    /// Days after delivery during which a return can be requested
    #[arg(long, env = "RETURN_WINDOW_DAYS", default_value = "7")]
    pub return_window_days: i64,

    /// Shared secret for payment signature verification
    #[arg(long, env = "PAYMENT_KEY_SECRET", hide_env_values = true)]
    pub payment_key_secret: String,

    /// Attempts for writes that hit a version conflict
    #[arg(long, env = "CONFLICT_RETRY_ATTEMPTS", default_value = "5")]
    pub conflict_retry_attempts: u32,
}

impl ServiceConfig {
    /// Load configuration from `.env`, the environment and CLI arguments
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn return_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.return_window_days.max(0))
    }
}
