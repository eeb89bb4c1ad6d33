// Core services
pub mod movements;
pub mod products;

// Read-model aggregations
pub mod dashboard;
