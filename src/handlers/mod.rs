pub mod calls;
pub mod config;

pub use calls::{get_call, list_calls};
pub use config::{get_config, update_config};
