pub mod models;
pub mod sqlite;

pub use models::*;
pub use sqlite::{MediaIndex, PoolStats, MIGRATOR};
