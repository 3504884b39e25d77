//! Key/value JSON persistence port and its backends.
//!
//! The snapshot store and cadence tracker only ever see [`KeyValueStore`];
//! which backend sits underneath is decided by whoever wires the app together.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

mod file;
mod memory;
mod sqlite;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const SNAPSHOT_KEY: &str = "breathwise.data-snapshot";
pub const CADENCE_KEY: &str = "breathwise.refresh-cadence";

#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

pub async fn write_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let encoded = serde_json::to_value(value)
        .with_context(|| format!("failed to encode value for {key}"))?;
    store.set(key, encoded).await
}
