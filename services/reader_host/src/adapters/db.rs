//! services/reader_host/src/adapters/db.rs
//!
//! This module contains the storage adapter, which is the concrete implementation
//! of the `AccessStateStore` port from the `core` crate. It persists the access
//! state in SQLite using `sqlx`, keyed by a store key so the rows survive
//! restarts and can be told apart from any other feature's data.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use note_access_core::domain::{AccessState, NoteId};
use note_access_core::ports::{AccessStateStore, PortError, PortResult};
use sqlx::{FromRow, SqlitePool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A SQLite adapter that implements the `AccessStateStore` port.
#[derive(Clone)]
pub struct SqliteAccessStore {
    pool: SqlitePool,
    store_key: String,
}

impl SqliteAccessStore {
    /// Creates a new `SqliteAccessStore`.
    pub fn new(pool: SqlitePool, store_key: impl Into<String>) -> Self {
        Self {
            pool,
            store_key: store_key.into(),
        }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct AccessStateRecord {
    is_premium: bool,
    last_view_ad_date: Option<NaiveDate>,
    practice_session_count: i64,
}

impl AccessStateRecord {
    fn to_domain(self, downloaded: Vec<i64>) -> AccessState {
        AccessState {
            is_premium: self.is_premium,
            last_view_ad_date: self.last_view_ad_date,
            downloaded_note_ids: downloaded.into_iter().map(NoteId).collect(),
            practice_session_count: u32::try_from(self.practice_session_count.max(0)).unwrap_or(u32::MAX),
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `AccessStateStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccessStateStore for SqliteAccessStore {
    async fn load(&self) -> PortResult<AccessState> {
        let record = sqlx::query_as::<_, AccessStateRecord>(
            "SELECT is_premium, last_view_ad_date, practice_session_count FROM access_state WHERE store_key = ?",
        )
        .bind(&self.store_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        let downloaded = sqlx::query_scalar::<_, i64>(
            "SELECT note_id FROM downloaded_notes WHERE store_key = ? ORDER BY note_id ASC",
        )
        .bind(&self.store_key)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(match record {
            Some(record) => record.to_domain(downloaded),
            None => AccessState {
                downloaded_note_ids: downloaded.into_iter().map(NoteId).collect(),
                ..AccessState::default()
            },
        })
    }

    async fn save(&self, state: &AccessState) -> PortResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO access_state (store_key, is_premium, last_view_ad_date, practice_session_count, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (store_key) DO UPDATE SET \
               is_premium = excluded.is_premium, \
               last_view_ad_date = excluded.last_view_ad_date, \
               practice_session_count = excluded.practice_session_count, \
               updated_at = excluded.updated_at",
        )
        .bind(&self.store_key)
        .bind(state.is_premium)
        .bind(state.last_view_ad_date)
        .bind(i64::from(state.practice_session_count))
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        // Downloads are append-only: rows missing from `state` are left alone.
        for note_id in &state.downloaded_note_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO downloaded_notes (store_key, note_id, unlocked_at) VALUES (?, ?, ?)",
            )
            .bind(&self.store_key)
            .bind(note_id.0)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store(key: &str) -> SqliteAccessStore {
        // One connection: every in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteAccessStore::new(pool, key);
        store.run_migrations().await.unwrap();
        store
    }

    #[tokio::test]
    async fn empty_store_loads_defaults() {
        let store = store("psc-ad-store").await;
        assert_eq!(store.load().await.unwrap(), AccessState::default());
    }

    #[tokio::test]
    async fn saved_state_round_trips() {
        let store = store("psc-ad-store").await;
        let mut state = AccessState {
            is_premium: false,
            last_view_ad_date: NaiveDate::from_ymd_opt(2024, 6, 15),
            practice_session_count: 3,
            ..Default::default()
        };
        state.mark_downloaded(NoteId(42));
        state.mark_downloaded(NoteId(7));

        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);

        state.is_premium = true;
        state.last_view_ad_date = NaiveDate::from_ymd_opt(2024, 6, 16);
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);
    }

    #[tokio::test]
    async fn downloads_are_never_removed() {
        let store = store("psc-ad-store").await;
        let mut state = AccessState::default();
        state.mark_downloaded(NoteId(1));
        store.save(&state).await.unwrap();

        store.save(&AccessState::default()).await.unwrap();
        assert!(store.load().await.unwrap().is_downloaded(NoteId(1)));
    }

    #[tokio::test]
    async fn store_keys_are_isolated() {
        let store_a = store("a").await;
        let store_b = SqliteAccessStore::new(store_a.pool.clone(), "b");

        store_a
            .save(&AccessState {
                is_premium: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!store_b.load().await.unwrap().is_premium);
    }
}
