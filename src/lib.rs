//! FreshStock API Library
//!
//! Stock ledger and FIFO allocation engine for perishable goods across a
//! hierarchical network of locations.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod migrator;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub sale_service: Arc<services::sales::SaleService>,
    pub transfer_service: Arc<services::transfers::TransferService>,
}

pub fn default_page() -> u64 {
    1
}

pub fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PagedMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct PagedMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: None,
        }
    }

    pub fn paged(data: T, meta: PagedMeta) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(meta),
        }
    }
}

/// The versioned API surface: stock queries plus the two stock operations.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/stock", handlers::stock::router())
        .nest("/sales", handlers::sales::router())
        .nest("/transfers", handlers::transfers::router())
}
