use std::sync::Arc;

use axum::Router;
use sea_orm::{ActiveModelTrait, Set};
use sea_orm_migration::MigratorTrait;
use tokio::sync::mpsc;
use uuid::Uuid;

use stockledger_api::{
    api_v1_routes,
    config::AppConfig,
    db,
    entities::product,
    events::{self, EventSender},
    handlers::AppServices,
    migrator::Migrator,
    services::movements::{MovementService, NewMovementItem},
    services::products::{CreateProductInput, ProductService},
    AppState,
};

/// Test harness backed by a file-based SQLite database in a temp directory.
///
/// The pool is pinned to a single connection so concurrent postings exercise
/// the same serialization the row locks provide on a server database.
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: tempfile::TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir");
        let db_path = db_dir.path().join("stockledger_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("db connect");
        Migrator::up(&pool, None).await.expect("run migrations");

        let db_arc = Arc::new(pool);
        let (tx, rx) = mpsc::channel(256);
        let event_sender = EventSender::new(tx);
        let event_task = tokio::spawn(events::process_events(rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone());
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        Self {
            state,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    #[allow(dead_code)]
    pub fn movements(&self) -> Arc<MovementService> {
        self.state.services.movements.clone()
    }

    #[allow(dead_code)]
    pub fn products(&self) -> Arc<ProductService> {
        self.state.services.products.clone()
    }

    /// Create a product and optionally force its stock to a starting level.
    pub async fn seed_product(&self, sku: &str, unit: &str, stock: i32) -> product::Model {
        let created = self
            .state
            .services
            .products
            .create_product(CreateProductInput {
                sku: sku.to_string(),
                name: format!("{} test product", sku),
                unit_of_measure: unit.to_string(),
            })
            .await
            .expect("create product");

        if stock == 0 {
            return created;
        }

        let mut active: product::ActiveModel = created.into();
        active.stock = Set(stock);
        active.update(&*self.state.db).await.expect("seed stock")
    }

    /// Reload a product row by id.
    #[allow(dead_code)]
    pub async fn reload_product(&self, id: Uuid) -> product::Model {
        self.state
            .services
            .products
            .get_product(id)
            .await
            .expect("reload product")
    }

    /// The versioned API surface wired to this app's state.
    #[allow(dead_code)]
    pub fn router(&self) -> Router {
        Router::new()
            .nest("/api/v1", api_v1_routes())
            .with_state(self.state.clone())
    }
}

#[allow(dead_code)]
pub fn item_for(product: &product::Model, quantity: i32) -> NewMovementItem {
    NewMovementItem {
        product_id: product.id,
        quantity,
        unit_of_measure: product.unit_of_measure.clone(),
    }
}

#[allow(dead_code)]
pub fn actor() -> Uuid {
    Uuid::new_v4()
}
