//! Infrastructure layer: configuration, persistence and identity provisioning.

pub mod config;
pub mod identity;
pub mod store;

pub use config::{AppConfig, ConfigError, Persistence};
pub use identity::resolve_context;
pub use store::{InMemoryStore, PostgresStore, Store, StoreError, StoreResult};
