//! HTTP API handlers for dropout-dash

pub mod dashboard;
pub mod dataset;
pub mod health;
pub mod predict;
pub mod status;

pub use dashboard::{
    get_categorical, get_correlation, get_distribution, get_filters, get_summary, get_table_page,
};
pub use dataset::reload_dataset;
pub use health::health_routes;
pub use predict::predict;
pub use status::get_status;
