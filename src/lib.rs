pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod integrity;
pub mod model;
pub mod radar;
pub mod similarity;
pub mod store;

pub use config::Config;
pub use error::{PraxisError, Result};
pub use model::{Entity, EntityDraft, EntityKind, EntityRef, RelKind};
