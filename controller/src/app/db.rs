//! `SQLite` persistence for batches, the machine state singleton and the device records.
//!
//! Singletons live in tables pinned to `id = 1`.

use core::str::FromStr as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use eyre::WrapErr as _;
use sqlx::{
    Acquire, FromRow, Sqlite, SqliteExecutor,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};

use crate::app::model::{
    Batch, BatchStatus, DeviceSignal, HeartbeatRecord, MachineState, ResourceLevel,
    normalize_batch_ref,
};

pub(crate) type DbPool = SqlitePool;

const IN_MEMORY: &str = ":memory:";

/// Open (creating if needed) the database and run the embedded migrations.
///
/// `:memory:` opens a private in-memory database on a single, never-recycled connection.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub(crate) async fn init(path: &Path) -> eyre::Result<DbPool> {
    let pool = if path.as_os_str() == IN_MEMORY {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?
    } else {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .wrap_err(format!("Failed to open database at {}", path.display()))?
    };

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .wrap_err("Failed to run database migrations")?;

    Ok(pool)
}

#[derive(FromRow)]
struct BatchRow {
    id: String,
    title: String,
    seed_type: String,
    output_count: i64,
    pots_done_count: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for Batch {
    type Error = sqlx::Error;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let status =
            BatchStatus::from_str(&row.status).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self {
            id: row.id,
            title: row.title,
            seed_type: row.seed_type,
            output_count: row.output_count,
            pots_done_count: row.pots_done_count,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) async fn insert_batch(db: impl SqliteExecutor<'_>, batch: &Batch) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO batches (id, title, seed_type, output_count, pots_done_count, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&batch.id)
    .bind(&batch.title)
    .bind(&batch.seed_type)
    .bind(batch.output_count)
    .bind(batch.pots_done_count)
    .bind(batch.status.to_string())
    .bind(batch.created_at)
    .bind(batch.updated_at)
    .execute(db)
    .await?;
    Ok(())
}

pub(crate) async fn get_batch(
    db: impl SqliteExecutor<'_>,
    id: &str,
) -> sqlx::Result<Option<Batch>> {
    sqlx::query_as::<_, BatchRow>("SELECT * FROM batches WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .map(Batch::try_from)
        .transpose()
}

/// All batches, most recent first.
pub(crate) async fn list_batches(db: impl SqliteExecutor<'_>) -> sqlx::Result<Vec<Batch>> {
    sqlx::query_as::<_, BatchRow>("SELECT * FROM batches ORDER BY created_at DESC, rowid DESC")
        .fetch_all(db)
        .await?
        .into_iter()
        .map(Batch::try_from)
        .collect()
}

/// Writes the mutable fields of a batch. Creation fields are never rewritten.
pub(crate) async fn save_batch(db: impl SqliteExecutor<'_>, batch: &Batch) -> sqlx::Result<()> {
    sqlx::query("UPDATE batches SET pots_done_count = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(batch.pots_done_count)
        .bind(batch.status.to_string())
        .bind(batch.updated_at)
        .bind(&batch.id)
        .execute(db)
        .await?;
    Ok(())
}

/// Returns whether a row was deleted.
pub(crate) async fn delete_batch(db: impl SqliteExecutor<'_>, id: &str) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM batches WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(FromRow)]
struct MachineStateRow {
    system_name: String,
    soil_level: i64,
    cup_level: i64,
    active_batch_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MachineStateRow> for MachineState {
    type Error = sqlx::Error;

    fn try_from(row: MachineStateRow) -> Result<Self, Self::Error> {
        let level =
            |raw: i64| ResourceLevel::try_from(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)));
        Ok(Self {
            system_name: row.system_name,
            soil_level: level(row.soil_level)?,
            cup_level: level(row.cup_level)?,
            active_batch_id: normalize_batch_ref(row.active_batch_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Loads the machine state, materializing the defaults on first access.
///
/// Returns a boxed `Send` future so callers holding a borrowed connection stay `Send`
/// (works around rust-lang/rust#102211 with the generic `Acquire` parameter).
pub(crate) fn load_machine_state<'a>(
    db: impl Acquire<'a, Database = Sqlite> + Send + 'a,
    now: DateTime<Utc>,
) -> core::pin::Pin<Box<dyn Future<Output = sqlx::Result<MachineState>> + Send + 'a>> {
    Box::pin(async move {
        let mut conn = db.acquire().await?;
        let defaults = MachineState::with_defaults(now);
        sqlx::query(
        "INSERT OR IGNORE INTO machine_state (id, system_name, soil_level, cup_level, active_batch_id, created_at, updated_at)
         VALUES (1, ?, ?, ?, NULL, ?, ?)",
    )
    .bind(&defaults.system_name)
    .bind(i64::from(defaults.soil_level))
    .bind(i64::from(defaults.cup_level))
    .bind(defaults.created_at)
    .bind(defaults.updated_at)
    .execute(&mut *conn)
    .await?;

        sqlx::query_as::<_, MachineStateRow>(
            "SELECT system_name, soil_level, cup_level, active_batch_id, created_at, updated_at
         FROM machine_state WHERE id = 1",
        )
        .fetch_one(&mut *conn)
        .await?
        .try_into()
    })
}

pub(crate) async fn save_machine_state(
    db: impl SqliteExecutor<'_>,
    state: &MachineState,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE machine_state SET soil_level = ?, cup_level = ?, active_batch_id = ?, updated_at = ?
         WHERE id = 1",
    )
    .bind(i64::from(state.soil_level))
    .bind(i64::from(state.cup_level))
    .bind(state.active_batch_id.as_deref())
    .bind(state.updated_at)
    .execute(db)
    .await?;
    Ok(())
}

pub(crate) async fn set_device_signal(
    db: impl SqliteExecutor<'_>,
    is_running: bool,
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO device_signal (id, is_running, updated_at) VALUES (1, ?, ?)
         ON CONFLICT (id) DO UPDATE SET is_running = excluded.is_running, updated_at = excluded.updated_at",
    )
    .bind(is_running)
    .bind(now)
    .execute(db)
    .await?;
    Ok(())
}

/// The run signal; a device that was never signalled should not run.
pub(crate) async fn get_device_signal(db: impl SqliteExecutor<'_>) -> sqlx::Result<DeviceSignal> {
    let row: Option<(bool, DateTime<Utc>)> =
        sqlx::query_as("SELECT is_running, updated_at FROM device_signal WHERE id = 1")
            .fetch_optional(db)
            .await?;
    Ok(row.map_or(
        DeviceSignal {
            is_running: false,
            updated_at: None,
        },
        |(is_running, updated_at)| DeviceSignal {
            is_running,
            updated_at: Some(updated_at),
        },
    ))
}

pub(crate) async fn upsert_heartbeat(
    db: impl SqliteExecutor<'_>,
    heartbeat: &HeartbeatRecord,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO device_heartbeat (id, last_heartbeat, wifi_ssid, wifi_rssi, ip_address) VALUES (1, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
            last_heartbeat = excluded.last_heartbeat,
            wifi_ssid = excluded.wifi_ssid,
            wifi_rssi = excluded.wifi_rssi,
            ip_address = excluded.ip_address",
    )
    .bind(heartbeat.last_heartbeat)
    .bind(heartbeat.wifi_ssid.as_deref())
    .bind(heartbeat.wifi_rssi)
    .bind(heartbeat.ip_address.as_deref())
    .execute(db)
    .await?;
    Ok(())
}

pub(crate) async fn get_heartbeat(
    db: impl SqliteExecutor<'_>,
) -> sqlx::Result<Option<HeartbeatRecord>> {
    let row: Option<(DateTime<Utc>, Option<String>, Option<i32>, Option<String>)> =
        sqlx::query_as(
            "SELECT last_heartbeat, wifi_ssid, wifi_rssi, ip_address FROM device_heartbeat WHERE id = 1",
        )
        .fetch_optional(db)
        .await?;
    Ok(row.map(
        |(last_heartbeat, wifi_ssid, wifi_rssi, ip_address)| HeartbeatRecord {
            last_heartbeat,
            wifi_ssid,
            wifi_rssi,
            ip_address,
        },
    ))
}

/// Simulates a foreign writer (old firmware, manual edits) touching the pointer directly.
#[cfg(test)]
pub(crate) async fn force_active_batch_id(
    db: impl SqliteExecutor<'_>,
    raw: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE machine_state SET active_batch_id = ? WHERE id = 1")
        .bind(raw)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn open_in_memory() -> DbPool {
    init(Path::new(IN_MEMORY))
        .await
        .expect("in-memory database should open")
}
