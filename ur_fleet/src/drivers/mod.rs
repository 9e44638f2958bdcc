mod manager;
pub use manager::*;

mod models;
pub use models::*;

mod driver_config;
pub use driver_config::*;
