#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc, unreachable_pub)]
use ephemera_server::adapters::storage::{MemoryMessageStore, MessageStore, ReadPolicy};
use ephemera_server::api::{self, MgmtState};
use ephemera_server::config::{
    Config, DatabaseConfig, HealthConfig, LogFormat, MessagingConfig, ServerConfig, TelemetryConfig,
};
use ephemera_server::domain::clock::{Clock, ManualClock};
use ephemera_server::{App, AppBuilder};
use std::sync::{Arc, Once};
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

static INIT: Once = Once::new();

pub const START: OffsetDateTime = datetime!(2024-05-01 08:00:00 UTC);

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("ephemera_server=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

pub fn get_test_config() -> Config {
    Config {
        database_url: None,
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            mgmt_port: 0,
            public_url: None,
            request_timeout_secs: 5,
            shutdown_timeout_secs: 1,
        },
        database: DatabaseConfig::default(),
        messaging: MessagingConfig { cleanup_interval_secs: 3600, ..MessagingConfig::default() },
        health: HealthConfig::default(),
        telemetry: TelemetryConfig { log_format: LogFormat::Text, otlp_endpoint: None, metrics_export_interval_secs: 60 },
    }
}

#[derive(Debug)]
pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryMessageStore>,
    pub config: Config,
    pub workers: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        setup_tracing();

        let clock = Arc::new(ManualClock::new(START));
        let read_policy = ReadPolicy::from_burn_after_read(config.messaging.burn_after_read);
        let store = Arc::new(MemoryMessageStore::new(Arc::clone(&clock) as Arc<dyn Clock>, read_policy));

        let (server_url, mgmt_url, shutdown_tx, workers) =
            serve(config.clone(), Arc::clone(&store) as Arc<dyn MessageStore>).await;

        Self { server_url, mgmt_url, client: reqwest::Client::new(), clock, store, config, workers, shutdown_tx }
    }

    pub async fn create(&self, content: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/api/message", self.server_url))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .unwrap()
    }

    pub async fn create_ok(&self, content: &str) -> serde_json::Value {
        let resp = self.create(content).await;
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    pub async fn fetch(&self, id: &str) -> reqwest::Response {
        self.client.get(format!("{}/api/message/{id}", self.server_url)).send().await.unwrap()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Binds both routers on ephemeral ports and starts the background workers.
pub async fn serve(
    config: Config,
    store: Arc<dyn MessageStore>,
) -> (String, String, watch::Sender<bool>, Vec<JoinHandle<()>>) {
    let App { message_service, health_service, workers } =
        AppBuilder::new(config.clone()).with_store(store).build().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_url = format!("http://{}", api_listener.local_addr().unwrap());
    let mgmt_url = format!("http://{}", mgmt_listener.local_addr().unwrap());

    let app_router = api::app_router(&config.server, message_service);
    let mgmt_app = api::mgmt_router(MgmtState { health_service });

    let mut api_rx = shutdown_rx.clone();
    tokio::spawn(async move {
        axum::serve(api_listener, app_router)
            .with_graceful_shutdown(async move {
                let _ = api_rx.wait_for(|&s| s).await;
            })
            .await
            .unwrap();
    });
    let mut mgmt_rx = shutdown_rx.clone();
    tokio::spawn(async move {
        axum::serve(mgmt_listener, mgmt_app)
            .with_graceful_shutdown(async move {
                let _ = mgmt_rx.wait_for(|&s| s).await;
            })
            .await
            .unwrap();
    });

    let workers = workers.spawn_all(shutdown_rx);
    (server_url, mgmt_url, shutdown_tx, workers)
}
