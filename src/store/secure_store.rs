//! Encrypted local persistence.
//!
//! Two tables: `queued_items` holds writes waiting for the backend, and
//! `secure_records` holds namespaced snapshots (face references, cached
//! history, day ledger, notification state). Every payload is sealed with the
//! device cipher. Each write is a single statement; there is no cross-row
//! transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::crypto::{PayloadCipher, open_json, seal_json};
use crate::error::StoreError;
use crate::model::queue::{HandlerFamily, PendingRecord, QueuedItem};

#[derive(FromRow)]
struct QueuedRow {
    id: String,
    family: String,
    logical_type: String,
    payload: Vec<u8>,
    saved_at: DateTime<Utc>,
}

impl From<QueuedRow> for QueuedItem {
    fn from(row: QueuedRow) -> Self {
        QueuedItem {
            id: row.id,
            family: row.family,
            logical_type: row.logical_type,
            encrypted_payload: row.payload,
            saved_at: row.saved_at,
        }
    }
}

pub struct SecureStore {
    pool: SqlitePool,
    cipher: Arc<dyn PayloadCipher>,
}

impl SecureStore {
    pub fn new(pool: SqlitePool, cipher: Arc<dyn PayloadCipher>) -> Self {
        Self { pool, cipher }
    }

    /// Queues a record for later delivery. Never touches the network.
    #[instrument(skip(self, record), fields(family = %record.family()))]
    pub async fn put(&self, record: &PendingRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let saved_at = Utc::now();
        let family = record.family();
        let logical_type = format!("{family}-{}", saved_at.timestamp_millis());
        let payload = seal_json(self.cipher.as_ref(), record)?;

        sqlx::query(
            r#"
            INSERT INTO queued_items (id, family, logical_type, payload, saved_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(family.as_ref())
        .bind(&logical_type)
        .bind(payload)
        .bind(saved_at)
        .execute(&self.pool)
        .await?;

        debug!(id = %id, logical_type = %logical_type, "record queued");
        Ok(id)
    }

    /// Oldest queued record of a family that still decrypts.
    pub async fn get(&self, family: HandlerFamily) -> Result<Option<PendingRecord>, StoreError> {
        Ok(self
            .list_family(family)
            .await?
            .into_iter()
            .next()
            .map(|(_, record)| record))
    }

    /// Replaces the payload of a queued item in place, keeping its id and
    /// position. Returns false when the item is gone.
    pub async fn reseal(&self, id: &str, record: &PendingRecord) -> Result<bool, StoreError> {
        let payload = seal_json(self.cipher.as_ref(), record)?;
        let result = sqlx::query("UPDATE queued_items SET payload = ? WHERE id = ? AND family = ?")
            .bind(payload)
            .bind(id)
            .bind(record.family().as_ref())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM queued_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every queued item, oldest first, still sealed.
    pub async fn list_all(&self) -> Result<Vec<QueuedItem>, StoreError> {
        let rows = sqlx::query_as::<_, QueuedRow>(
            r#"
            SELECT id, family, logical_type, payload, saved_at
            FROM queued_items
            ORDER BY saved_at, rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(QueuedItem::from).collect())
    }

    /// Decrypted records of one family; undecryptable rows are skipped.
    pub async fn list_family(
        &self,
        family: HandlerFamily,
    ) -> Result<Vec<(QueuedItem, PendingRecord)>, StoreError> {
        let rows = sqlx::query_as::<_, QueuedRow>(
            r#"
            SELECT id, family, logical_type, payload, saved_at
            FROM queued_items
            WHERE family = ?
            ORDER BY saved_at, rowid
            "#,
        )
        .bind(family.as_ref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(QueuedItem::from)
            .filter_map(|item| self.open(&item).map(|record| (item, record)))
            .collect())
    }

    pub fn open(&self, item: &QueuedItem) -> Option<PendingRecord> {
        let record = open_json(self.cipher.as_ref(), &item.encrypted_payload);
        if record.is_none() {
            warn!(id = %item.id, logical_type = %item.logical_type, "queued item could not be decrypted, skipping");
        }
        record
    }

    pub async fn pending_count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queued_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn save_record<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let payload = seal_json(self.cipher.as_ref(), value)?;
        sqlx::query(
            r#"
            INSERT INTO secure_records (namespace, record_key, payload, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (namespace, record_key)
            DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `None` when absent or no longer decryptable.
    pub async fn load_record<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT payload FROM secure_records WHERE namespace = ? AND record_key = ?",
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(payload,)| open_json(self.cipher.as_ref(), &payload)))
    }

    pub async fn load_namespace<T: DeserializeOwned>(
        &self,
        namespace: &str,
    ) -> Result<Vec<(String, T)>, StoreError> {
        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT record_key, payload FROM secure_records WHERE namespace = ? ORDER BY record_key",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, payload)| {
                open_json(self.cipher.as_ref(), &payload).map(|value| (key, value))
            })
            .collect())
    }

    pub async fn remove_record(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM secure_records WHERE namespace = ? AND record_key = ?")
                .bind(namespace)
                .bind(key)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::model::employee::EmployeeId;
    use crate::model::notification::{NewNotification, NotificationCategory};
    use crate::store::crypto::tests::TEST_KDF;
    use crate::store::crypto::{DeviceCipher, DeviceKeyFile};

    async fn store(dir: &tempfile::TempDir) -> SecureStore {
        let pool = init_db("sqlite::memory:").await.unwrap();
        let cipher = DeviceCipher::new(DeviceKeyFile::new(dir.path().join("device.key")), TEST_KDF);
        SecureStore::new(pool, Arc::new(cipher))
    }

    fn notification(title: &str) -> PendingRecord {
        PendingRecord::Notification(NewNotification::new(
            EmployeeId(9),
            NotificationCategory::Info,
            title,
            "body",
        ))
    }

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let record = notification("queued");

        let id = store.put(&record).await.unwrap();
        assert_eq!(
            store.get(HandlerFamily::NotificationPending).await.unwrap(),
            Some(record)
        );
        assert_eq!(store.get(HandlerFamily::IncidentPending).await.unwrap(), None);

        let items = store.list_all().await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].logical_type.starts_with("notification-pending-"));

        store.delete(&id).await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_skips_corrupt_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        sqlx::query(
            "INSERT INTO queued_items (id, family, logical_type, payload, saved_at) VALUES ('bad', 'notification-pending', 'notification-pending-0', x'00ff', ?)",
        )
        .bind(Utc::now() - chrono::Duration::minutes(5))
        .execute(&store.pool)
        .await
        .unwrap();
        let good = notification("second");
        store.put(&good).await.unwrap();

        assert_eq!(
            store.get(HandlerFamily::NotificationPending).await.unwrap(),
            Some(good)
        );
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn records_are_namespaced_and_upserted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.save_record("a", "k", &1u32).await.unwrap();
        store.save_record("a", "k", &2u32).await.unwrap();
        store.save_record("b", "k", &3u32).await.unwrap();

        assert_eq!(store.load_record::<u32>("a", "k").await.unwrap(), Some(2));
        assert_eq!(
            store.load_namespace::<u32>("b").await.unwrap(),
            vec![("k".to_string(), 3)]
        );
        assert!(store.remove_record("a", "k").await.unwrap());
        assert_eq!(store.load_record::<u32>("a", "k").await.unwrap(), None);
    }
}
