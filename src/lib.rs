//! StockLedger API Library
//!
//! Inventory stock tracking through a ledger of discrete movements. The
//! heart of the crate is the movement posting engine in
//! [`services::movements`]: a DRAFT -> POSTED / CANCELLED state machine and
//! an atomic, lock-ordered application of stock deltas that keeps every
//! product's stock non-negative under concurrent posting.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Compose the versioned API surface
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/movements", handlers::movements::movements_router())
        .nest("/products", handlers::products::products_router())
        .nest("/dashboard", handlers::dashboard::dashboard_router())
}
