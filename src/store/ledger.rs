use std::sync::Arc;

use super::secure_store::SecureStore;
use crate::error::StoreError;
use crate::model::attendance::{AttendanceKind, DayKey, TodayStatus};
use crate::model::employee::EmployeeId;

const NAMESPACE: &str = "day_ledger";

/// Per employee and day: whether an entry and an exit are already registered,
/// including those still waiting in the queue.
pub struct DayLedger {
    store: Arc<SecureStore>,
}

impl DayLedger {
    pub fn new(store: Arc<SecureStore>) -> Self {
        Self { store }
    }

    pub async fn status(&self, employee: EmployeeId, day: DayKey) -> Result<TodayStatus, StoreError> {
        Ok(self
            .store
            .load_record::<TodayStatus>(NAMESPACE, &key(employee, day))
            .await?
            .unwrap_or_default())
    }

    pub async fn mark(
        &self,
        employee: EmployeeId,
        day: DayKey,
        kind: AttendanceKind,
    ) -> Result<TodayStatus, StoreError> {
        let mut status = self.status(employee, day).await?;
        status.mark(kind);
        self.store
            .save_record(NAMESPACE, &key(employee, day), &status)
            .await?;
        Ok(status)
    }

    /// Unions `seen` into what is already recorded.
    pub async fn merge(
        &self,
        employee: EmployeeId,
        day: DayKey,
        seen: TodayStatus,
    ) -> Result<TodayStatus, StoreError> {
        let current = self.status(employee, day).await?;
        let merged = TodayStatus {
            entry: current.entry || seen.entry,
            exit: current.exit || seen.exit,
        };
        if merged != current {
            self.store
                .save_record(NAMESPACE, &key(employee, day), &merged)
                .await?;
        }
        Ok(merged)
    }

    /// Forgets the employee's days before `today`; only the current day's
    /// flags ever decide the next registration.
    pub async fn prune_before(&self, employee: EmployeeId, today: DayKey) -> Result<usize, StoreError> {
        let prefix = format!("{employee}:");
        let mut removed = 0;
        for (key, _) in self.store.load_namespace::<TodayStatus>(NAMESPACE).await? {
            let day = key.strip_prefix(&prefix).and_then(|d| d.parse::<u32>().ok());
            if day.is_some_and(|d| d < today.0) && self.store.remove_record(NAMESPACE, &key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn key(employee: EmployeeId, day: DayKey) -> String {
    format!("{employee}:{}", day.0)
}
