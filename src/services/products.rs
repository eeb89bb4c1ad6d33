use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        inventory_movement_item::{self, Entity as InventoryMovementItem},
        product::{self, Column as ProductColumn, Entity as Product},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone)]
pub struct CreateProductInput {
    pub sku: String,
    pub name: String,
    pub unit_of_measure: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProductInput {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub unit_of_measure: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ProductQuery {
    pub q: Option<String>,
    pub is_active: Option<bool>,
    pub unit_of_measure: Option<String>,
    pub page: u64,
    pub limit: u64,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            q: None,
            is_active: None,
            unit_of_measure: None,
            page: 1,
            limit: 10,
        }
    }
}

/// Service for managing the product catalog.
///
/// Stock is deliberately absent from the write surface here: it belongs to
/// movement posting alone.
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ProductService {
    /// Creates a new product service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Create a new product. Stock always starts at zero; receipts bring it up.
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        let db = &*self.db_pool;

        let existing = Product::find()
            .filter(ProductColumn::Sku.eq(&input.sku))
            .one(db)
            .await?;

        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Product with SKU {} already exists",
                input.sku
            )));
        }

        let now = chrono::Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(input.sku),
            name: Set(input.name),
            unit_of_measure: Set(input.unit_of_measure),
            is_active: Set(true),
            stock: Set(0),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(db).await?;

        self.emit(Event::ProductCreated(created.id)).await;
        info!(product_id = %created.id, sku = %created.sku, "Product created");

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        let db = &*self.db_pool;

        Product::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product with id {} not found", id)))
    }

    /// Update catalog attributes. Every save bumps the optimistic `version`
    /// tag; stock is never touched on this path.
    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        let db = &*self.db_pool;
        let existing = self.get_product(id).await?;

        if let Some(sku) = &input.sku {
            if sku != &existing.sku {
                let conflict = Product::find()
                    .filter(ProductColumn::Sku.eq(sku))
                    .one(db)
                    .await?;
                if conflict.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "Product with SKU {} already exists",
                        sku
                    )));
                }
            }
        }

        let version = existing.version;
        let mut active: product::ActiveModel = existing.into();
        if let Some(sku) = input.sku {
            active.sku = Set(sku);
        }
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(unit) = input.unit_of_measure {
            active.unit_of_measure = Set(unit);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.version = Set(version + 1);

        let updated = active.update(db).await?;

        self.emit(Event::ProductUpdated(updated.id)).await;

        Ok(updated)
    }

    /// Delete a product that no movement item references.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = self.get_product(id).await?;

        let referenced = InventoryMovementItem::find()
            .filter(inventory_movement_item::Column::ProductId.eq(id))
            .count(db)
            .await?;
        if referenced > 0 {
            return Err(ServiceError::Conflict(format!(
                "Product {} is referenced by {} movement item(s) and cannot be deleted",
                existing.sku, referenced
            )));
        }

        existing.delete(db).await?;

        self.emit(Event::ProductDeleted(id)).await;
        info!(product_id = %id, "Product deleted");

        Ok(())
    }

    /// List products with optional filtering and pagination
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: ProductQuery,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let db = &*self.db_pool;
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, 100);

        let mut select = Product::find();

        if let Some(q) = &query.q {
            select = select.filter(
                Condition::any()
                    .add(ProductColumn::Sku.contains(q))
                    .add(ProductColumn::Name.contains(q)),
            );
        }
        if let Some(is_active) = query.is_active {
            select = select.filter(ProductColumn::IsActive.eq(is_active));
        }
        if let Some(unit) = &query.unit_of_measure {
            select = select.filter(ProductColumn::UnitOfMeasure.eq(unit));
        }

        let paginator = select
            .order_by_desc(ProductColumn::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page - 1).await?;

        Ok((products, total))
    }

    /// Unlocked batch fetch used by the movement validation paths.
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<product::Model>, ServiceError> {
        let db = &*self.db_pool;

        let products = Product::find()
            .filter(ProductColumn::Id.is_in(ids.iter().copied()))
            .all(db)
            .await?;

        Ok(products)
    }

    /// Exclusively locked batch fetch, used only inside the posting
    /// transaction. Rows are requested in ascending id order in a single
    /// statement so concurrent postings acquire locks in the same order.
    pub async fn find_by_ids_for_update<C>(
        conn: &C,
        ids: &[Uuid],
    ) -> Result<Vec<product::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let products = Product::find()
            .filter(ProductColumn::Id.is_in(ids.iter().copied()))
            .order_by_asc(ProductColumn::Id)
            .lock_exclusive()
            .all(conn)
            .await?;

        Ok(products)
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!("Failed to publish product event: {}", e);
        }
    }
}
