use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Product master record.
///
/// `stock` is only ever mutated inside the locked section of movement
/// posting. `version` is bumped on every save and serves optimistic callers
/// outside the posting path; the two mechanisms are independent.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// SKU (Stock Keeping Unit), unique business key
    #[validate(length(
        min = 1,
        max = 64,
        message = "SKU must be between 1 and 64 characters"
    ))]
    pub sku: String,

    /// Product name
    #[validate(length(
        min = 1,
        max = 120,
        message = "Product name must be between 1 and 120 characters"
    ))]
    pub name: String,

    /// Unit the product is counted in (e.g. "pcs", "kg")
    #[validate(length(
        min = 1,
        max = 16,
        message = "Unit of measure must be between 1 and 16 characters"
    ))]
    pub unit_of_measure: String,

    /// Is the product active
    pub is_active: bool,

    /// On-hand stock; invariant: never negative
    pub stock: i32,

    /// Optimistic concurrency tag, incremented on every save
    pub version: i32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Product entity relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_movement_item::Entity")]
    MovementItems,
}

impl Related<super::inventory_movement_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MovementItems.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }
            active_model.created_at = Set(Utc::now());
        }

        active_model.updated_at = Set(Utc::now());

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        Ok(active_model)
    }
}
