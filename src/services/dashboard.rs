use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        inventory_movement::{self, Entity as InventoryMovement},
        inventory_movement_item::{self, Entity as InventoryMovementItem},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
};

/// Products with stock below this count as "low stock" on the dashboard
const LOW_STOCK_THRESHOLD: i32 = 10;
const RECENT_MOVEMENT_COUNT: u64 = 10;

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub total_products: u64,
    pub active_products: u64,
    pub total_stock: i64,
    pub low_stock_count: u64,
    pub recent_movements: Vec<RecentMovement>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecentMovement {
    pub id: Uuid,
    pub movement_type: String,
    pub status: String,
    pub reference: Option<String>,
    pub created_by: Uuid,
    pub item_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Read-model aggregations backing the overview dashboard
pub struct DashboardService {
    db_pool: Arc<DbPool>,
}

impl DashboardService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<DashboardSummary, ServiceError> {
        let db = &*self.db_pool;

        let total_products = Product::find().count(db).await?;
        let active_products = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .count(db)
            .await?;

        let total_stock: Option<i64> = Product::find()
            .select_only()
            .column_as(
                Expr::col((product::Entity, product::Column::Stock)).sum(),
                "total_stock",
            )
            .into_tuple()
            .one(db)
            .await?
            .flatten();

        let low_stock_count = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(product::Column::Stock.lt(LOW_STOCK_THRESHOLD))
            .count(db)
            .await?;

        let movements = InventoryMovement::find()
            .order_by_desc(inventory_movement::Column::CreatedAt)
            .limit(RECENT_MOVEMENT_COUNT)
            .all(db)
            .await?;

        let movement_ids: Vec<Uuid> = movements.iter().map(|m| m.id).collect();
        let items = InventoryMovementItem::find()
            .filter(inventory_movement_item::Column::MovementId.is_in(movement_ids))
            .all(db)
            .await?;
        let mut counts: HashMap<Uuid, u64> = HashMap::new();
        for item in items {
            *counts.entry(item.movement_id).or_insert(0) += 1;
        }

        let recent_movements = movements
            .into_iter()
            .map(|m| RecentMovement {
                item_count: counts.get(&m.id).copied().unwrap_or(0),
                id: m.id,
                movement_type: m.movement_type,
                status: m.status,
                reference: m.reference,
                created_by: m.created_by,
                created_at: m.created_at,
            })
            .collect();

        Ok(DashboardSummary {
            total_products,
            active_products,
            total_stock: total_stock.unwrap_or(0),
            low_stock_count,
            recent_movements,
        })
    }
}
