pub mod dtos;
pub mod store;

pub use store::{
    EventResourceStore, MemoryStore, PgStore, PipelineFilter, PipelineStore, StoreError,
};

use sqlx::migrate::Migrator;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");
