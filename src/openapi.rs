use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "StockLedger API",
        version = "0.1.0",
        description = r#"
Inventory stock ledger with transactional movement posting.

Stock levels change only by posting movements (receipts, issues,
adjustments, transfers). Posting is atomic: either every line item's stock
delta commits, or none does, and stock never goes negative.

Each error response carries a stable machine-readable `code` (e.g.
`STOCK_UNDERFLOW`, `INVALID_STATE_TRANSITION`) plus a structured `details`
payload where applicable.
"#,
        license(name = "MIT")
    ),
    paths(
        handlers::movements::list_movements,
        handlers::movements::create_movement,
        handlers::movements::get_movement,
        handlers::movements::update_movement,
        handlers::movements::delete_movement,
        handlers::movements::add_item,
        handlers::movements::remove_item,
        handlers::movements::post_movement,
        handlers::movements::cancel_movement,
        handlers::products::list_products,
        handlers::products::create_product,
        handlers::products::get_product,
        handlers::products::update_product,
        handlers::products::delete_product,
        handlers::dashboard::get_summary,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::inventory_movement::MovementType,
        crate::entities::inventory_movement::MovementStatus,
        handlers::movements::CreateMovementRequest,
        handlers::movements::UpdateMovementRequest,
        handlers::movements::MovementItemRequest,
        handlers::movements::MovementResponse,
        handlers::movements::MovementItemResponse,
        handlers::movements::MovementListEntry,
        handlers::movements::MovementListResponse,
        handlers::products::CreateProductRequest,
        handlers::products::UpdateProductRequest,
        handlers::products::ProductResponse,
        handlers::products::ProductListResponse,
        crate::services::dashboard::DashboardSummary,
        crate::services::dashboard::RecentMovement,
    )),
    tags(
        (name = "movements", description = "Movement lifecycle and posting"),
        (name = "products", description = "Product catalog"),
        (name = "dashboard", description = "Aggregated read models")
    )
)]
pub struct ApiDoc;

/// Swagger UI router, mounted by the binary at `/docs`
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
