use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionError, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        inventory_movement::{self, Entity as InventoryMovement, MovementStatus, MovementType},
        inventory_movement_item::{self, Entity as InventoryMovementItem},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::products::ProductService,
};

#[derive(Debug, Clone)]
pub struct NewMovementItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_of_measure: String,
}

#[derive(Debug, Clone)]
pub struct CreateMovementInput {
    pub movement_type: MovementType,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<NewMovementItem>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMovementInput {
    pub movement_type: Option<MovementType>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MovementQuery {
    pub status: Option<MovementStatus>,
    pub movement_type: Option<MovementType>,
    pub page: u64,
    pub limit: u64,
}

impl Default for MovementQuery {
    fn default() -> Self {
        Self {
            status: None,
            movement_type: None,
            page: 1,
            limit: 10,
        }
    }
}

/// A movement item joined with its product master data
#[derive(Debug, Clone)]
pub struct MovementItemDetail {
    pub item: inventory_movement_item::Model,
    pub product: product::Model,
}

/// A movement with its items eagerly resolved
#[derive(Debug, Clone)]
pub struct MovementDetail {
    pub movement: inventory_movement::Model,
    pub items: Vec<MovementItemDetail>,
}

/// List-view projection: header plus item count
#[derive(Debug, Clone)]
pub struct MovementSummary {
    pub movement: inventory_movement::Model,
    pub item_count: u64,
}

/// Stock mutation applied by a committed posting, used for event emission
#[derive(Debug, Clone)]
struct StockChange {
    product_id: Uuid,
    sku: String,
    previous_stock: i32,
    new_stock: i32,
}

/// Movement lifecycle controller.
///
/// Enforces the DRAFT -> POSTED / DRAFT -> CANCELLED state machine and owns
/// the transactional posting algorithm that turns line items into durable
/// stock changes.
pub struct MovementService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl MovementService {
    /// Creates a new movement service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Create a new DRAFT movement with at least one validated item.
    ///
    /// No stock is touched here; stock changes happen only at posting.
    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        input: CreateMovementInput,
        actor_id: Uuid,
    ) -> Result<MovementDetail, ServiceError> {
        let db = &*self.db_pool;

        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "A movement requires at least one item".to_string(),
            ));
        }
        for item in &input.items {
            validate_quantity(input.movement_type, item.quantity)?;
        }

        let mut product_ids: Vec<Uuid> = input.items.iter().map(|i| i.product_id).collect();
        product_ids.sort();
        product_ids.dedup();

        let products = Product::find()
            .filter(product::Column::Id.is_in(product_ids.iter().copied()))
            .all(db)
            .await?;
        let product_map: HashMap<Uuid, product::Model> =
            products.into_iter().map(|p| (p.id, p)).collect();

        for item in &input.items {
            let found = product_map.get(&item.product_id).ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Product with id {} not found",
                    item.product_id
                ))
            })?;
            if found.unit_of_measure != item.unit_of_measure {
                return Err(ServiceError::UnitMismatch {
                    sku: found.sku.clone(),
                    expected: found.unit_of_measure.clone(),
                    got: item.unit_of_measure.clone(),
                });
            }
        }

        let now = Utc::now();
        let movement_id = Uuid::new_v4();
        let movement = inventory_movement::ActiveModel {
            id: Set(movement_id),
            movement_type: Set(input.movement_type.as_str().to_string()),
            status: Set(MovementStatus::Draft.as_str().to_string()),
            reference: Set(input.reference.clone()),
            notes: Set(input.notes.clone()),
            created_by: Set(actor_id),
            posted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let items = input.items.clone();
        db.transaction::<_, (), ServiceError>(move |txn| {
            Box::pin(async move {
                movement.insert(txn).await?;
                for item in items {
                    let model = inventory_movement_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        movement_id: Set(movement_id),
                        product_id: Set(item.product_id),
                        quantity: Set(item.quantity),
                        unit_of_measure: Set(item.unit_of_measure),
                        created_at: Set(Utc::now()),
                        updated_at: Set(Utc::now()),
                    };
                    model.insert(txn).await?;
                }
                Ok(())
            })
        })
        .await
        .map_err(unwrap_transaction_error)?;

        self.emit(Event::MovementCreated {
            movement_id,
            movement_type: input.movement_type.as_str().to_string(),
            item_count: input.items.len(),
        })
        .await;
        info!(movement_id = %movement_id, movement_type = %input.movement_type.as_str(), "Movement created");

        self.find_by_id(movement_id).await
    }

    /// Load a movement with its items and referenced products.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<MovementDetail, ServiceError> {
        let db = &*self.db_pool;

        let movement = InventoryMovement::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Movement with id {} not found", id)))?;

        let items = movement
            .find_related(InventoryMovementItem)
            .order_by_asc(inventory_movement_item::Column::CreatedAt)
            .order_by_asc(inventory_movement_item::Column::Id)
            .all(db)
            .await?;

        let mut product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        product_ids.sort();
        product_ids.dedup();

        let products = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await?;
        let product_map: HashMap<Uuid, product::Model> =
            products.into_iter().map(|p| (p.id, p)).collect();

        let mut details = Vec::with_capacity(items.len());
        for item in items {
            let found = product_map.get(&item.product_id).cloned().ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Movement item {} references missing product {}",
                    item.id, item.product_id
                ))
            })?;
            details.push(MovementItemDetail {
                item,
                product: found,
            });
        }

        Ok(MovementDetail {
            movement,
            items: details,
        })
    }

    /// List movements newest-first with optional status/type filters.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        query: MovementQuery,
    ) -> Result<(Vec<MovementSummary>, u64), ServiceError> {
        let db = &*self.db_pool;
        let page = query.page.max(1);
        let limit = query.limit.clamp(1, 100);

        let mut select = InventoryMovement::find();
        if let Some(status) = query.status {
            select = select.filter(inventory_movement::Column::Status.eq(status.as_str()));
        }
        if let Some(movement_type) = query.movement_type {
            select = select
                .filter(inventory_movement::Column::MovementType.eq(movement_type.as_str()));
        }

        let paginator = select
            .order_by_desc(inventory_movement::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let movements = paginator.fetch_page(page - 1).await?;

        let movement_ids: Vec<Uuid> = movements.iter().map(|m| m.id).collect();
        let items = InventoryMovementItem::find()
            .filter(inventory_movement_item::Column::MovementId.is_in(movement_ids))
            .all(db)
            .await?;
        let mut counts: HashMap<Uuid, u64> = HashMap::new();
        for item in items {
            *counts.entry(item.movement_id).or_insert(0) += 1;
        }

        let summaries = movements
            .into_iter()
            .map(|movement| {
                let item_count = counts.get(&movement.id).copied().unwrap_or(0);
                MovementSummary {
                    movement,
                    item_count,
                }
            })
            .collect();

        Ok((summaries, total))
    }

    /// Patch header fields of a DRAFT movement.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: Uuid,
        patch: UpdateMovementInput,
    ) -> Result<MovementDetail, ServiceError> {
        let db = &*self.db_pool;
        let detail = self.find_by_id(id).await?;
        ensure_draft(&detail.movement, "update")?;

        let mut active: inventory_movement::ActiveModel = detail.movement.into();
        if let Some(movement_type) = patch.movement_type {
            active.movement_type = Set(movement_type.as_str().to_string());
        }
        if let Some(reference) = patch.reference {
            active.reference = Set(Some(reference));
        }
        if let Some(notes) = patch.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Utc::now());
        active.update(db).await?;

        self.emit(Event::MovementUpdated(id)).await;

        self.find_by_id(id).await
    }

    /// Delete a DRAFT movement and all of its items.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let detail = self.find_by_id(id).await?;
        ensure_draft(&detail.movement, "delete")?;

        db.transaction::<_, (), ServiceError>(move |txn| {
            Box::pin(async move {
                InventoryMovementItem::delete_many()
                    .filter(inventory_movement_item::Column::MovementId.eq(id))
                    .exec(txn)
                    .await?;
                InventoryMovement::delete_by_id(id).exec(txn).await?;
                Ok(())
            })
        })
        .await
        .map_err(unwrap_transaction_error)?;

        self.emit(Event::MovementDeleted(id)).await;
        info!(movement_id = %id, "Movement deleted");

        Ok(())
    }

    /// Attach an item to a DRAFT movement, revalidating product existence and
    /// unit of measure exactly as in `create`.
    #[instrument(skip(self, item))]
    pub async fn add_item(
        &self,
        movement_id: Uuid,
        item: NewMovementItem,
    ) -> Result<MovementDetail, ServiceError> {
        let db = &*self.db_pool;
        let detail = self.find_by_id(movement_id).await?;
        ensure_draft(&detail.movement, "add an item to")?;

        let movement_type = MovementType::from_str(&detail.movement.movement_type)
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Movement {} has unknown type {}",
                    movement_id, detail.movement.movement_type
                ))
            })?;
        validate_quantity(movement_type, item.quantity)?;

        let found = Product::find_by_id(item.product_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product with id {} not found", item.product_id))
            })?;
        if found.unit_of_measure != item.unit_of_measure {
            return Err(ServiceError::UnitMismatch {
                sku: found.sku.clone(),
                expected: found.unit_of_measure.clone(),
                got: item.unit_of_measure.clone(),
            });
        }

        let item_id = Uuid::new_v4();
        let model = inventory_movement_item::ActiveModel {
            id: Set(item_id),
            movement_id: Set(movement_id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
            unit_of_measure: Set(item.unit_of_measure),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        model.insert(db).await?;

        self.emit(Event::MovementItemAdded {
            movement_id,
            item_id,
            product_id: found.id,
        })
        .await;

        self.find_by_id(movement_id).await
    }

    /// Remove an item from its owning DRAFT movement.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let item = InventoryMovementItem::find_by_id(item_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Movement item with id {} not found", item_id))
            })?;

        let movement = InventoryMovement::find_by_id(item.movement_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Movement with id {} not found",
                    item.movement_id
                ))
            })?;
        ensure_draft(&movement, "remove an item from")?;

        let movement_id = movement.id;
        item.delete(db).await?;

        self.emit(Event::MovementItemRemoved {
            movement_id,
            item_id,
        })
        .await;

        Ok(())
    }

    /// Post a DRAFT movement: atomically apply its stock deltas and move it
    /// to the terminal POSTED state.
    ///
    /// The whole algorithm runs in one transaction. The distinct product set
    /// is locked `FOR UPDATE` in ascending id order in a single statement, so
    /// two postings sharing a product serialize on the row locks and the
    /// second observes post-commit stock. Any failure rolls everything back;
    /// no partial stock change is ever visible.
    #[instrument(skip(self))]
    pub async fn post(&self, id: Uuid) -> Result<MovementDetail, ServiceError> {
        let db = &*self.db_pool;

        let (posted, changes) = db
            .transaction::<_, (inventory_movement::Model, Vec<StockChange>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let movement = InventoryMovement::find_by_id(id)
                            .one(txn)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Movement with id {} not found",
                                    id
                                ))
                            })?;

                        if !movement.is_draft() {
                            return Err(ServiceError::InvalidStateTransition(format!(
                                "Cannot post movement with status {}. Only DRAFT movements can be posted.",
                                movement.status
                            )));
                        }
                        let movement_type = MovementType::from_str(&movement.movement_type)
                            .ok_or_else(|| {
                                ServiceError::InternalError(format!(
                                    "Movement {} has unknown type {}",
                                    movement.id, movement.movement_type
                                ))
                            })?;

                        let items = InventoryMovementItem::find()
                            .filter(inventory_movement_item::Column::MovementId.eq(id))
                            .order_by_asc(inventory_movement_item::Column::CreatedAt)
                            .order_by_asc(inventory_movement_item::Column::Id)
                            .all(txn)
                            .await?;
                        if items.is_empty() {
                            return Err(ServiceError::EmptyMovement);
                        }

                        // Lock the distinct product set in ascending id order.
                        let mut product_ids: Vec<Uuid> =
                            items.iter().map(|i| i.product_id).collect();
                        product_ids.sort();
                        product_ids.dedup();

                        let products =
                            ProductService::find_by_ids_for_update(txn, &product_ids).await?;
                        let mut locked: BTreeMap<Uuid, product::Model> =
                            products.into_iter().map(|p| (p.id, p)).collect();
                        if let Some(missing) =
                            product_ids.iter().find(|pid| !locked.contains_key(pid))
                        {
                            return Err(ServiceError::NotFound(format!(
                                "Product with id {} not found",
                                missing
                            )));
                        }

                        // Accumulate per-product deltas in item order so repeated
                        // references to one product combine before the bound check.
                        let mut deltas: BTreeMap<Uuid, i64> = BTreeMap::new();
                        for item in &items {
                            *deltas.entry(item.product_id).or_insert(0) +=
                                stock_delta(movement_type, item.quantity);
                        }

                        let mut changes = Vec::with_capacity(deltas.len());
                        for (product_id, delta) in &deltas {
                            let locked_product = locked.get(product_id).ok_or_else(|| {
                                ServiceError::InternalError(format!(
                                    "Locked product {} disappeared during posting",
                                    product_id
                                ))
                            })?;
                            let resulting = i64::from(locked_product.stock) + delta;
                            if resulting < 0 {
                                return Err(ServiceError::StockUnderflow {
                                    product_id: locked_product.id,
                                    sku: locked_product.sku.clone(),
                                    current_stock: locked_product.stock,
                                    requested_change: *delta,
                                    resulting_stock: resulting,
                                });
                            }
                            let new_stock = i32::try_from(resulting).map_err(|_| {
                                ServiceError::Conflict(format!(
                                    "Stock for product {} exceeds the storable range",
                                    locked_product.sku
                                ))
                            })?;
                            changes.push(StockChange {
                                product_id: locked_product.id,
                                sku: locked_product.sku.clone(),
                                previous_stock: locked_product.stock,
                                new_stock,
                            });
                        }

                        for change in &changes {
                            let locked_product =
                                locked.remove(&change.product_id).ok_or_else(|| {
                                    ServiceError::InternalError(format!(
                                        "Locked product {} disappeared during posting",
                                        change.product_id
                                    ))
                                })?;
                            let version = locked_product.version;
                            let mut active: product::ActiveModel = locked_product.into();
                            active.stock = Set(change.new_stock);
                            active.version = Set(version + 1);
                            active.update(txn).await?;
                        }

                        let now = Utc::now();
                        let mut active: inventory_movement::ActiveModel = movement.into();
                        active.status = Set(MovementStatus::Posted.as_str().to_string());
                        active.posted_at = Set(Some(now));
                        active.updated_at = Set(now);
                        let posted = active.update(txn).await?;

                        Ok((posted, changes))
                    })
                },
            )
            .await
            .map_err(unwrap_transaction_error)?;

        let detail = self.find_by_id(id).await?;

        let posted_at = posted.posted_at.unwrap_or_else(Utc::now);
        self.emit(Event::MovementPosted {
            movement_id: posted.id,
            movement_type: posted.movement_type.clone(),
            item_count: detail.items.len(),
            posted_at,
        })
        .await;
        for change in &changes {
            self.emit(Event::StockLevelChanged {
                movement_id: posted.id,
                product_id: change.product_id,
                sku: change.sku.clone(),
                previous_stock: change.previous_stock,
                new_stock: change.new_stock,
            })
            .await;
        }
        info!(
            movement_id = %posted.id,
            movement_type = %posted.movement_type,
            products = %changes.len(),
            "Movement posted"
        );

        Ok(detail)
    }

    /// Cancel a DRAFT movement. DRAFT movements never mutated stock, so this
    /// has no stock effect; CANCELLED is terminal.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<MovementDetail, ServiceError> {
        let db = &*self.db_pool;
        let detail = self.find_by_id(id).await?;
        ensure_draft(&detail.movement, "cancel")?;

        let mut active: inventory_movement::ActiveModel = detail.movement.into();
        active.status = Set(MovementStatus::Cancelled.as_str().to_string());
        active.updated_at = Set(Utc::now());
        active.update(db).await?;

        self.emit(Event::MovementCancelled(id)).await;
        info!(movement_id = %id, "Movement cancelled");

        self.find_by_id(id).await
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!("Failed to publish movement event: {}", e);
        }
    }
}

fn ensure_draft(
    movement: &inventory_movement::Model,
    action: &str,
) -> Result<(), ServiceError> {
    if movement.is_draft() {
        Ok(())
    } else {
        Err(ServiceError::InvalidStateTransition(format!(
            "Cannot {} movement with status {}. Only DRAFT movements can be modified.",
            action, movement.status
        )))
    }
}

fn unwrap_transaction_error(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

/// Signed stock effect of a single item under the given movement type.
///
/// IN adds, OUT subtracts, ADJUST applies the item quantity as a signed
/// delta, TRANSFER is stock-neutral (reserved for future multi-location
/// support).
fn stock_delta(movement_type: MovementType, quantity: i32) -> i64 {
    match movement_type {
        MovementType::In => i64::from(quantity),
        MovementType::Out => -i64::from(quantity),
        MovementType::Adjust => i64::from(quantity),
        MovementType::Transfer => 0,
    }
}

/// Item quantity rule: non-zero always; strictly positive except for ADJUST,
/// which carries a signed delta.
fn validate_quantity(movement_type: MovementType, quantity: i32) -> Result<(), ServiceError> {
    if quantity == 0 {
        return Err(ServiceError::ValidationError(
            "Item quantity must be non-zero".to_string(),
        ));
    }
    if quantity < 0 && movement_type != MovementType::Adjust {
        return Err(ServiceError::ValidationError(format!(
            "Item quantity must be positive for {} movements",
            movement_type.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_follows_movement_type() {
        assert_eq!(stock_delta(MovementType::In, 7), 7);
        assert_eq!(stock_delta(MovementType::Out, 7), -7);
        assert_eq!(stock_delta(MovementType::Adjust, -3), -3);
        assert_eq!(stock_delta(MovementType::Adjust, 3), 3);
        assert_eq!(stock_delta(MovementType::Transfer, 7), 0);
    }

    #[test]
    fn quantity_must_be_positive_except_for_adjust() {
        assert!(validate_quantity(MovementType::In, 1).is_ok());
        assert!(validate_quantity(MovementType::Out, 0).is_err());
        assert!(validate_quantity(MovementType::Out, -1).is_err());
        assert!(validate_quantity(MovementType::Transfer, -1).is_err());
        assert!(validate_quantity(MovementType::Adjust, -1).is_ok());
        assert!(validate_quantity(MovementType::Adjust, 0).is_err());
    }
}
