//! Test harnesses.
//!
//! `TestHarness` wires everything to the in-memory store and is cheap to
//! build per test. `PgHarness` uses a shared Postgres container; containers
//! and migrations are initialized once on first use, then reused.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::{watch, OnceCell};
use url::Url;

use coin_toss_core::domains::aggregation::{AggregationPipeline, LiveSnapshot};
use coin_toss_core::domains::results::Participant;
use coin_toss_core::kernel::{MemoryMarkerStore, MemoryStore, PgStore, ServerDeps, StreamHub};
use coin_toss_core::server::build_app;

pub const BASE_URL: &str = "https://toss.example.org";

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory store, markers and the HTTP app on top of them.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub markers: Arc<MemoryMarkerStore>,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            store: Arc::new(MemoryStore::new()),
            markers: Arc::new(MemoryMarkerStore::new()),
        }
    }

    pub fn deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.store.clone(),
            self.store.hub().clone(),
            Url::parse(BASE_URL).expect("valid base url"),
        )
    }

    pub fn app(&self) -> Router {
        build_app(self.deps(), Vec::new())
    }

    /// A participant on this device (shares the harness markers).
    pub async fn participant(&self, token: &str) -> Participant {
        Participant::join(self.store.clone(), self.markers.clone(), Some(token)).await
    }

    /// A participant on a fresh device.
    pub async fn participant_on_new_device(&self, token: &str) -> Participant {
        Participant::join(
            self.store.clone(),
            Arc::new(MemoryMarkerStore::new()),
            Some(token),
        )
        .await
    }

    pub fn pipeline(&self) -> AggregationPipeline {
        AggregationPipeline::spawn(self.store.clone())
    }

    /// Give in-flight feed deliveries time to be applied.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait (up to 5s) until a snapshot satisfies `done`.
pub async fn snapshot_when<F>(pipeline: &AggregationPipeline, done: F) -> LiveSnapshot
where
    F: FnMut(&LiveSnapshot) -> bool,
{
    wait_for(pipeline.subscribe(), done).await
}

pub async fn wait_for<T, F>(mut rx: watch::Receiver<T>, done: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let value = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(done))
        .await
        .expect("timed out waiting for state")
        .expect("sender dropped");
    value.clone()
}

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        // Run migrations once on the shared database
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Postgres-backed store on the shared container.
pub struct PgHarness {
    pub db_pool: PgPool,
    pub store: Arc<PgStore>,
}

impl AsyncTestContext for PgHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }
}

impl PgHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;
        let store = Arc::new(PgStore::connect(db_pool.clone(), StreamHub::new()).await?);
        Ok(Self { db_pool, store })
    }
}
