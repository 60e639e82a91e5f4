use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Database connection URL. Messages are kept in process memory when unset.
    #[arg(long, env = "EPHEMERA_DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "EPHEMERA_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the public API
    #[arg(long, env = "EPHEMERA_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for liveness and readiness probes
    #[arg(long, env = "EPHEMERA_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Externally visible base address used to build retrieval links (e.g. `https://notes.example.com`).
    /// Derived from the request's Host header when unset.
    #[arg(long, env = "EPHEMERA_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Maximum time a single API request may take
    #[arg(long, env = "EPHEMERA_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// How long to wait for background tasks during shutdown
    #[arg(long, env = "EPHEMERA_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Maximum number of pooled connections
    #[arg(long = "db-max-connections", env = "EPHEMERA_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open
    #[arg(long = "db-min-connections", env = "EPHEMERA_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    /// How long to wait for a free connection
    #[arg(long = "db-acquire-timeout-secs", env = "EPHEMERA_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 3)]
    pub acquire_timeout_secs: u64,

    /// Idle connections are closed after this long
    #[arg(long = "db-idle-timeout-secs", env = "EPHEMERA_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    /// Connections are recycled after this long
    #[arg(long = "db-max-lifetime-secs", env = "EPHEMERA_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 3,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// How often to purge expired messages
    #[arg(long, env = "EPHEMERA_CLEANUP_INTERVAL_SECS", default_value_t = 60)]
    pub cleanup_interval_secs: u64,

    /// Upper bound on any single store operation
    #[arg(long, env = "EPHEMERA_STORE_TIMEOUT_MS", default_value_t = 3000)]
    pub store_timeout_ms: u64,

    /// Total insert attempts when a generated id collides
    #[arg(long, env = "EPHEMERA_INSERT_ATTEMPTS", default_value_t = 3)]
    pub insert_attempts: usize,

    /// Delete a message as soon as it has been read once
    #[arg(long, env = "EPHEMERA_BURN_AFTER_READ", default_value_t = false)]
    pub burn_after_read: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { cleanup_interval_secs: 60, store_timeout_ms: 3000, insert_attempts: 3, burn_after_read: false }
    }
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the store readiness check
    #[arg(id = "health_store_timeout_ms", long = "health-store-timeout-ms", env = "EPHEMERA_HEALTH_STORE_TIMEOUT_MS", default_value_t = 2000)]
    pub store_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { store_timeout_ms: 2000 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "EPHEMERA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint for traces and metrics. Export is disabled when unset.
    #[arg(long, env = "EPHEMERA_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// How often metrics are pushed to the collector
    #[arg(long, env = "EPHEMERA_METRICS_EXPORT_INTERVAL_SECS", default_value_t = 60)]
    pub metrics_export_interval_secs: u64,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
