use std::sync::Arc;

use axum::Router;

use crate::{Warehouse, WeatherSource};

mod health;
mod push;

// ---

/// Collaborators shared by every request. Constructed once in `main`.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub weather: Arc<dyn WeatherSource>,
    pub warehouse: Arc<dyn Warehouse>,
    pub table_id: Arc<str>,
}

impl AppState {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        warehouse: Arc<dyn Warehouse>,
        table_id: &str,
    ) -> Self {
        // ---
        Self {
            weather,
            warehouse,
            table_id: Arc::from(table_id),
        }
    }
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(push::router())
        .merge(health::router())
        .with_state(state)
}
