use std::sync::Arc;

use axum::{Router, routing::get};

use crate::app::services::AppServices;
use crate::middleware;

pub mod admin;
pub mod cashbox;
pub mod common;
pub mod customers;
pub mod expenses;
pub mod inventory;
pub mod invoices;
pub mod loans;
pub mod products;
pub mod sales;
pub mod services_catalog;
pub mod system;
pub mod users;

/// Router for all authenticated (tenant-scoped) endpoints.
///
/// Domain routes additionally sit behind the subscription gate; admin
/// routes do not, so a lapsed tenant can still be managed.
pub fn router(services: Arc<AppServices>) -> Router {
    let gated = Router::new()
        .nest("/products", products::router())
        .nest("/customers", customers::router())
        .nest("/services", services_catalog::router())
        .nest("/stores", inventory::stores_router())
        .nest("/counts", inventory::counts_router())
        .nest("/transfers", inventory::transfers_router())
        .nest("/sales", sales::router())
        .nest("/invoices", invoices::router())
        .nest("/cashbox", cashbox::router())
        .nest("/expenses", expenses::router())
        .nest("/loans", loans::router())
        .layer(axum::middleware::from_fn_with_state(
            services,
            middleware::tenant_gate,
        ));

    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/admin", admin::router())
        .merge(gated)
}
