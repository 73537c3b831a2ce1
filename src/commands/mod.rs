mod migrate;
mod service;

pub use migrate::run_migrate;
pub use service::{run_refresh, run_service, ServiceAction};
