//! # Notification Outbox Repository
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SINGLE TRANSACTION (settlement engine)                                 │
//! │                                                                         │
//! │   1. INSERT INTO sales (status 'pending', …)                            │
//! │   2. INSERT INTO notification_outbox ('sale.pending_confirmation', …)   │
//! │                                                                         │
//! │  COMMIT ← both rows land or neither does                                │
//! │                                                                         │
//! │  An external notifier drains pending entries out-of-band; the core      │
//! │  never waits on delivery.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use bodega_core::NotificationOutboxEntry;

/// Repository for notification outbox operations.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    /// Creates a new OutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Queues an event inside an open transaction, so the notification
    /// commits together with the state it announces.
    pub async fn queue_tx(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        event_type: &str,
        entity_id: &str,
        payload: &str,
    ) -> DbResult<NotificationOutboxEntry> {
        let entry = NotificationOutboxEntry {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            event_type: event_type.to_string(),
            entity_id: entity_id.to_string(),
            payload: payload.to_string(),
            created_at: Utc::now(),
            dispatched_at: None,
        };

        debug!(event_type = %event_type, entity_id = %entity_id, "Queuing notification");

        sqlx::query(
            r#"
            INSERT INTO notification_outbox (
                id, tenant_id, event_type, entity_id, payload, created_at, dispatched_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.tenant_id)
        .bind(&entry.event_type)
        .bind(&entry.entity_id)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .bind(entry.dispatched_at)
        .execute(&mut *conn)
        .await?;

        Ok(entry)
    }

    /// Pending (undispatched) entries, oldest first.
    pub async fn list_pending(
        &self,
        tenant_id: &str,
        limit: u32,
    ) -> DbResult<Vec<NotificationOutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, event_type, entity_id, payload, created_at, dispatched_at
            FROM notification_outbox
            WHERE tenant_id = ?1 AND dispatched_at IS NULL
            ORDER BY created_at
            LIMIT ?2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Marks an entry as handed to the notifier.
    pub async fn mark_dispatched(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE notification_outbox SET dispatched_at = ?2 WHERE id = ?1 AND dispatched_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OutboxEntry (pending)", id));
        }
        Ok(())
    }
}

fn entry_from_row(row: &SqliteRow) -> DbResult<NotificationOutboxEntry> {
    Ok(NotificationOutboxEntry {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        event_type: row.try_get("event_type")?,
        entity_id: row.try_get("entity_id")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        dispatched_at: row.try_get::<Option<DateTime<Utc>>, _>("dispatched_at")?,
    })
}
