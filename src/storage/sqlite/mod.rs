use std::{
    path::Path,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::oneshot;

mod migrations;

use super::KeyValueStore;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Owns the connection thread. Dropping the last handle closes the task
/// channel, which ends the thread's receive loop, then joins it.
struct Worker {
    tasks: Option<mpsc::Sender<StoreTask>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.tasks.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log_error!("storage thread panicked");
            }
        }
    }
}

/// SQLite-backed key/value store.
///
/// One thread owns the connection; callers hand it closures and await the
/// reply, so every read and write is serialized. Clones share the thread.
#[derive(Clone)]
pub struct SqliteStore {
    worker: Arc<Worker>,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create storage directory {}", parent.display())
            })?;
        }

        let conn = open_connection(db_path)?;
        let (tasks, inbox) = mpsc::channel::<StoreTask>();
        let thread = thread::Builder::new()
            .name("breathwise-storage".into())
            .spawn(move || {
                let mut conn = conn;
                for task in inbox {
                    task(&mut conn);
                }
            })
            .context("failed to spawn storage thread")?;

        log_info!("SQLite storage opened at {}", db_path.display());
        Ok(Self {
            worker: Arc::new(Worker {
                tasks: Some(tasks),
                thread: Some(thread),
            }),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let tasks = self
            .worker
            .tasks
            .as_ref()
            .ok_or_else(|| anyhow!("storage thread already stopped"))?;

        tasks
            .send(Box::new(move |conn| {
                // The caller may have given up waiting; nothing to do then.
                let _ = reply_tx.send(task(conn));
            }))
            .map_err(|_| anyhow!("storage thread is gone"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("storage thread dropped the request"))?
    }
}

/// Opened and migrated on the caller's thread so failures surface from `open`.
fn open_connection(db_path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("failed to open SQLite storage at {}", db_path.display()))?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        log_error!("failed to enable WAL mode: {err}");
    }
    migrations::migrate(&mut conn).context("failed to migrate storage schema")?;
    Ok(conn)
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("failed to read {key}"))?;

            raw.map(|text| {
                serde_json::from_str(&text)
                    .with_context(|| format!("stored value for {key} is not valid JSON"))
            })
            .transpose()
        })
        .await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let key = key.to_string();
        let encoded = serde_json::to_string(&value)?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, encoded, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write {key}"))?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
                .with_context(|| format!("failed to delete {key}"))?;
            Ok(())
        })
        .await
    }
}
