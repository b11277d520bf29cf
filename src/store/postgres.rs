//! PostgreSQL storage backends using sqlx.
//!
//! Expected schema:
//!
//! - `notifications (id uuid primary key, item_type text, item_id bigint,
//!   recipient_id bigint, payload jsonb, created_at timestamptz,
//!   "read" boolean, unique (item_type, item_id, recipient_id))`
//! - `subscriptions (item_type text, item_id bigint, recipient_id bigint,
//!   channel text, created_at timestamptz,
//!   primary key (item_type, item_id, recipient_id, channel))`
//! - `recipients (id bigint primary key, username text, email text)`
//!
//! The unique key on the notification triple is the storage-level backstop
//! for the dedup guarantee: the batched insert uses
//! `ON CONFLICT DO NOTHING ... RETURNING` so conflicting rows are skipped
//! and only the surviving rows are reported back for delivery.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::model::{
    LoadOptions, Notification, NotificationMatch, RecipientRecord, Subscription, UpdateFields,
};

use super::{NotificationStore, RecipientStore, StorageError};

fn row_to_notification(row: &PgRow) -> Result<Notification, sqlx::Error> {
    Ok(Notification {
        id: row.try_get("id")?,
        item_type: row.try_get("item_type")?,
        item_id: row.try_get("item_id")?,
        recipient_id: row.try_get("recipient_id")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        read: row.try_get("read")?,
    })
}

/// PostgreSQL notification store.
pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pool from configuration and wrap it.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        tracing::info!(
            pool_size = config.pool_size,
            "PostgreSQL connection pool created"
        );

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn select(&self, options: &LoadOptions) -> Result<Vec<Notification>, StorageError> {
        // Order clause comes from closed enums, never from caller strings.
        let sql = format!(
            "SELECT id, item_type, item_id, recipient_id, payload, created_at, \"read\" \
             FROM notifications WHERE recipient_id = $1 \
             ORDER BY {} {} LIMIT $2 OFFSET $3",
            options.order_by.column(),
            options.order_dir.keyword(),
        );

        let rows = sqlx::query(&sql)
            .bind(options.recipient_id)
            .bind(options.limit as i64)
            .bind(options.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| row_to_notification(r).map_err(StorageError::from))
            .collect()
    }

    async fn batch_insert(
        &self,
        rows: Vec<Notification>,
    ) -> Result<Vec<Notification>, StorageError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO notifications \
             (id, item_type, item_id, recipient_id, payload, created_at, \"read\") ",
        );
        builder.push_values(rows.iter(), |mut b, row| {
            b.push_bind(row.id)
                .push_bind(&row.item_type)
                .push_bind(row.item_id)
                .push_bind(row.recipient_id)
                .push_bind(&row.payload)
                .push_bind(row.created_at)
                .push_bind(row.read);
        });
        builder.push(" ON CONFLICT (item_type, item_id, recipient_id) DO NOTHING RETURNING id");

        let inserted_ids: HashSet<Uuid> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();

        Ok(rows
            .into_iter()
            .filter(|row| inserted_ids.contains(&row.id))
            .collect())
    }

    async fn update(
        &self,
        matcher: &NotificationMatch,
        fields: &UpdateFields,
    ) -> Result<u64, StorageError> {
        if fields.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::new("UPDATE notifications SET ");
        let mut first = true;
        if let Some(payload) = &fields.payload {
            builder.push("payload = ").push_bind(payload);
            first = false;
        }
        if let Some(read) = fields.read {
            if !first {
                builder.push(", ");
            }
            builder.push("\"read\" = ").push_bind(read);
        }

        builder.push(" WHERE item_type = ").push_bind(&matcher.item_type);
        builder
            .push(" AND item_id = ANY(")
            .push_bind(&matcher.item_ids)
            .push(")");
        if let Some(recipient_id) = matcher.recipient_id {
            builder.push(" AND recipient_id = ").push_bind(recipient_id);
        }

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, matcher: &NotificationMatch) -> Result<u64, StorageError> {
        let mut builder = QueryBuilder::new("DELETE FROM notifications WHERE item_type = ");
        builder.push_bind(&matcher.item_type);
        builder
            .push(" AND item_id = ANY(")
            .push_bind(&matcher.item_ids)
            .push(")");
        if let Some(recipient_id) = matcher.recipient_id {
            builder.push(" AND recipient_id = ").push_bind(recipient_id);
        }

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn existing_recipients(
        &self,
        item_type: &str,
        item_id: i64,
    ) -> Result<HashSet<i64>, StorageError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT recipient_id FROM notifications WHERE item_type = $1 AND item_id = $2",
        )
        .bind(item_type)
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn insert_subscription(&self, subscription: Subscription) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO subscriptions (item_type, item_id, recipient_id, channel, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (item_type, item_id, recipient_id, channel) DO NOTHING",
        )
        .bind(&subscription.item_type)
        .bind(subscription.item_id)
        .bind(subscription.recipient_id)
        .bind(subscription.channel.as_str())
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_subscription(
        &self,
        item_type: &str,
        item_id: i64,
        recipient_id: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "DELETE FROM subscriptions \
             WHERE item_type = $1 AND item_id = $2 AND recipient_id = $3",
        )
        .bind(item_type)
        .bind(item_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// PostgreSQL recipient store.
pub struct PostgresRecipientStore {
    pool: PgPool,
}

impl PostgresRecipientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientStore for PostgresRecipientStore {
    async fn batch_get(&self, ids: &[i64]) -> Result<Vec<RecipientRecord>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, username, email FROM recipients WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| {
                Ok(RecipientRecord {
                    id: r.try_get("id")?,
                    username: r.try_get("username")?,
                    email: r.try_get("email")?,
                })
            })
            .collect()
    }
}
