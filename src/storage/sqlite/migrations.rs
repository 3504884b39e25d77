use anyhow::{ensure, Context, Result};
use rusqlite::Connection;

/// Script `i` upgrades the schema from version `i` to `i + 1`.
const MIGRATIONS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

/// Bring the schema up to [`SCHEMA_VERSION`], tracked in `PRAGMA user_version`.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let applied: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    ensure!(
        applied <= SCHEMA_VERSION,
        "storage schema version {applied} is newer than supported {SCHEMA_VERSION}"
    );
    if applied == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, script) in MIGRATIONS.iter().enumerate().skip(applied as usize) {
        tx.execute_batch(script)
            .with_context(|| format!("schema migration to version {} failed", index + 1))?;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}
