//! Persistence of scraped notices in SQLite.
//!
//! The table has no unique constraint; [`reconcile`] keeps it free of duplicates by
//! looking each notice up before inserting it. Concurrent reconciles against one
//! database are not supported.

use std::str::FromStr;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::parse::NoticeRecord;
use crate::Result;

/// A notice as stored, with its generated id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedNotice {
    pub id: i64,
    pub date_range: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub notice_type: Option<String>,
    pub unit: Option<String>,
    pub road: Option<String>,
    pub url: Option<String>,
}

/// Opens (creating if missing) the database at `database_url` and brings its schema up to date.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    run_migrations(&pool).await?;
    tracing::info!("Database ready at {}", database_url);
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Saves the notices that aren't stored yet and returns how many were inserted.
///
/// A notice is already stored when a row has the same `url`, or, for notices without
/// a url, the same `name`. Existing rows are never updated. With `clear_existing` the
/// table is emptied (and committed) first. All inserts share one transaction.
pub async fn reconcile(
    pool: &SqlitePool,
    records: &[NoticeRecord],
    clear_existing: bool,
) -> Result<u64> {
    if clear_existing {
        let deleted = sqlx::query("DELETE FROM construction_notices")
            .execute(pool)
            .await?
            .rows_affected();
        tracing::info!("Cleared {deleted} existing notices");
    }

    let mut tx = pool.begin().await?;
    let mut saved_count = 0;
    for record in records {
        if find_existing(&mut tx, record).await?.is_some() {
            continue;
        }
        insert(&mut tx, record).await?;
        saved_count += 1;
    }
    // Dropping `tx` on an early return above rolls the whole batch back.
    tx.commit().await?;

    tracing::info!(
        "Saved {saved_count} new notices, skipped {}",
        records.len() as u64 - saved_count
    );
    Ok(saved_count)
}

async fn find_existing(conn: &mut SqliteConnection, record: &NoticeRecord) -> Result<Option<i64>> {
    let id = match &record.url {
        Some(url) => {
            sqlx::query_scalar("SELECT id FROM construction_notices WHERE url = ? LIMIT 1")
                .bind(url)
                .fetch_optional(&mut *conn)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT id FROM construction_notices WHERE name = ? LIMIT 1")
                .bind(&record.name)
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    Ok(id)
}

async fn insert(conn: &mut SqliteConnection, record: &NoticeRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO construction_notices (date_range, name, type, unit, road, url)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.date_range)
    .bind(&record.name)
    .bind(&record.notice_type)
    .bind(&record.unit)
    .bind(&record.road)
    .bind(&record.url)
    .execute(conn)
    .await?;
    Ok(())
}

/// All stored notices in insertion order.
pub async fn list_notices(pool: &SqlitePool) -> Result<Vec<PersistedNotice>> {
    let rows = sqlx::query(
        "SELECT id, date_range, name, type, unit, road, url
         FROM construction_notices
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let notices = rows
        .iter()
        .map(notice_from_row)
        .collect::<core::result::Result<_, sqlx::Error>>()?;
    Ok(notices)
}

pub async fn count_notices(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM construction_notices")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn notice_from_row(row: &SqliteRow) -> core::result::Result<PersistedNotice, sqlx::Error> {
    Ok(PersistedNotice {
        id: row.try_get("id")?,
        date_range: row.try_get("date_range")?,
        name: row.try_get("name")?,
        notice_type: row.try_get("type")?,
        unit: row.try_get("unit")?,
        road: row.try_get("road")?,
        url: row.try_get("url")?,
    })
}
