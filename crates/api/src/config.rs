use bites_core::lock::{LockConfig, DEFAULT_LOCK_TTL_SECS, DEFAULT_NEARING_EXPIRY_SECS};

/// Secret used when `PAYMENT_SIGNING_SECRET` is unset. Development only.
pub const DEV_PAYMENT_SECRET: &str = "dev-payment-secret";

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Lock lifetime and reporting thresholds.
    pub locks: LockConfig,
    /// Interval between scheduled sweeps, in seconds (default: `60`).
    pub sweep_interval_secs: u64,
    /// Shared secret the payment gateway signs verifications with.
    pub payment_signing_secret: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                    |
    /// |----------------------------|----------------------------|
    /// | `HOST`                     | `0.0.0.0`                  |
    /// | `PORT`                     | `3000`                     |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                       |
    /// | `LOCK_TTL_SECS`            | `1800`                     |
    /// | `LOCK_NEARING_EXPIRY_SECS` | `300`                      |
    /// | `LOCK_SWEEP_INTERVAL_SECS` | `60`                       |
    /// | `PAYMENT_SIGNING_SECRET`   | `dev-payment-secret`       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let ttl_secs: i64 = std::env::var("LOCK_TTL_SECS")
            .unwrap_or_else(|_| DEFAULT_LOCK_TTL_SECS.to_string())
            .parse()
            .expect("LOCK_TTL_SECS must be a valid i64");
        assert!(ttl_secs > 0, "LOCK_TTL_SECS must be positive");

        let nearing_expiry_secs: i64 = std::env::var("LOCK_NEARING_EXPIRY_SECS")
            .unwrap_or_else(|_| DEFAULT_NEARING_EXPIRY_SECS.to_string())
            .parse()
            .expect("LOCK_NEARING_EXPIRY_SECS must be a valid i64");

        let sweep_interval_secs: u64 = std::env::var("LOCK_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("LOCK_SWEEP_INTERVAL_SECS must be a valid u64");
        assert!(sweep_interval_secs > 0, "LOCK_SWEEP_INTERVAL_SECS must be positive");

        let payment_signing_secret = std::env::var("PAYMENT_SIGNING_SECRET").unwrap_or_else(|_| {
            tracing::warn!("PAYMENT_SIGNING_SECRET not set, using development secret");
            DEV_PAYMENT_SECRET.into()
        });

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            locks: LockConfig {
                ttl_secs,
                nearing_expiry_secs,
            },
            sweep_interval_secs,
            payment_signing_secret,
        }
    }
}
