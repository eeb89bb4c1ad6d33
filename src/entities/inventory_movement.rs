use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Direction a movement applies to stock when posted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
    Adjust,
    Transfer,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjust => "ADJUST",
            MovementType::Transfer => "TRANSFER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(MovementType::In),
            "OUT" => Some(MovementType::Out),
            "ADJUST" => Some(MovementType::Adjust),
            "TRANSFER" => Some(MovementType::Transfer),
            _ => None,
        }
    }
}

/// Lifecycle state of a movement.
///
/// DRAFT is the only mutable state; POSTED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementStatus {
    Draft,
    Posted,
    Cancelled,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::Draft => "DRAFT",
            MovementStatus::Posted => "POSTED",
            MovementStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(MovementStatus::Draft),
            "POSTED" => Some(MovementStatus::Posted),
            "CANCELLED" => Some(MovementStatus::Cancelled),
            _ => None,
        }
    }
}

/// Inventory movement header: a ledger transaction over one or more products
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Stored as string; see [`MovementType`]
    pub movement_type: String,
    /// Stored as string; see [`MovementStatus`]
    pub status: String,
    /// Free-form document reference (PO number, delivery note, ...)
    pub reference: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    /// User that created the movement
    pub created_by: Uuid,
    /// Set exactly once, when the movement is posted
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_draft(&self) -> bool {
        self.status == MovementStatus::Draft.as_str()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_movement_item::Entity")]
    Items,
}

impl Related<super::inventory_movement_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
