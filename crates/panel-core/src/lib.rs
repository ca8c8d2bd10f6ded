pub mod config;
pub mod identity;
pub mod types;

pub use config::{ConfigError, PanelConfig, RuntimeEndpoint};
pub use identity::{identifier, labels};
pub use types::*;
