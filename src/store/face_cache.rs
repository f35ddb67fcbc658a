use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use super::secure_store::SecureStore;
use crate::error::StoreError;
use crate::model::employee::EmployeeId;
use crate::model::face::FaceReference;

const NAMESPACE: &str = "face_reference";

/// Last face reference downloaded per employee, kept for offline comparison.
/// The encrypted row survives restarts; the in-memory layer only saves decrypts.
pub struct FaceReferenceCache {
    store: Arc<SecureStore>,
    hot: Cache<EmployeeId, FaceReference>,
}

impl FaceReferenceCache {
    pub fn new(store: Arc<SecureStore>, ttl: Duration) -> Self {
        Self {
            store,
            hot: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn save(&self, employee: EmployeeId, reference: &FaceReference) -> Result<(), StoreError> {
        self.store
            .save_record(NAMESPACE, &employee.to_string(), reference)
            .await?;
        self.hot.insert(employee, reference.clone()).await;
        Ok(())
    }

    pub async fn load(&self, employee: EmployeeId) -> Result<Option<FaceReference>, StoreError> {
        if let Some(reference) = self.hot.get(&employee).await {
            return Ok(Some(reference));
        }
        let reference = self
            .store
            .load_record::<FaceReference>(NAMESPACE, &employee.to_string())
            .await?;
        if let Some(reference) = &reference {
            self.hot.insert(employee, reference.clone()).await;
        }
        Ok(reference)
    }
}
