//! Attendance history per employee: day summaries and punctuality stats.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{instrument, warn};

use crate::backend::RemoteBackend;
use crate::error::{StoreError, SyncError};
use crate::model::attendance::{
    AttendanceHistory, AttendanceKind, AttendanceRecord, AttendanceStats, DayKey, DaySummary,
    Punctuality, TodayStatus,
};
use crate::model::employee::EmployeeId;
use crate::model::queue::{HandlerFamily, PendingRecord};
use crate::store::{DayLedger, SecureStore};
use crate::sync::Connectivity;
use crate::verify::Clock;

const NAMESPACE: &str = "attendance_history";

pub struct AttendanceHistoryService {
    backend: Arc<dyn RemoteBackend>,
    store: Arc<SecureStore>,
    ledger: Arc<DayLedger>,
    clock: Arc<dyn Clock>,
    connectivity: Connectivity,
}

impl AttendanceHistoryService {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        store: Arc<SecureStore>,
        ledger: Arc<DayLedger>,
        clock: Arc<dyn Clock>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            backend,
            store,
            ledger,
            clock,
            connectivity,
        }
    }

    /// Fresh from the backend when possible, otherwise the last snapshot.
    /// Registrations still waiting in the queue are included either way.
    #[instrument(skip(self))]
    pub async fn history(&self, employee: EmployeeId) -> Result<AttendanceHistory, StoreError> {
        if self.connectivity.is_online() {
            match self.refresh(employee).await {
                Ok(history) => return Ok(history),
                Err(SyncError::Store(e)) => return Err(e),
                Err(e) => warn!(error = %e, %employee, "history unavailable, using snapshot"),
            }
        }

        let records = self
            .store
            .load_record::<Vec<AttendanceRecord>>(NAMESPACE, &employee.to_string())
            .await?
            .unwrap_or_default();
        self.build(employee, records, false).await
    }

    /// Downloads the records, replaces the snapshot and feeds the day ledger
    /// with today's registrations. Earlier ledger days are dropped.
    #[instrument(skip(self))]
    pub async fn refresh(&self, employee: EmployeeId) -> Result<AttendanceHistory, SyncError> {
        let records = self.backend.list_attendance(employee).await?;
        self.store
            .save_record(NAMESPACE, &employee.to_string(), &records)
            .await?;

        let mut seen: BTreeMap<DayKey, TodayStatus> = BTreeMap::new();
        for record in &records {
            seen.entry(record.day()).or_default().mark(record.kind);
        }
        let today = self.clock.today();
        for (day, status) in seen.range(today..) {
            self.ledger.merge(employee, *day, *status).await?;
        }
        self.ledger.prune_before(employee, today).await?;

        Ok(self.build(employee, records, true).await?)
    }

    async fn build(
        &self,
        employee: EmployeeId,
        mut records: Vec<AttendanceRecord>,
        fresh: bool,
    ) -> Result<AttendanceHistory, StoreError> {
        for (_, pending) in self.store.list_family(HandlerFamily::AttendancePending).await? {
            if let PendingRecord::Attendance(record) = pending {
                if record.employee_id == employee {
                    records.push(record);
                }
            }
        }

        let days = summarize(&records);
        let stats = stats(&days);
        Ok(AttendanceHistory { days, stats, fresh })
    }
}

/// One summary per day, newest first: earliest entry, latest exit.
pub fn summarize(records: &[AttendanceRecord]) -> Vec<DaySummary> {
    let mut days: BTreeMap<NaiveDate, (Option<(NaiveTime, Punctuality)>, Option<NaiveTime>)> =
        BTreeMap::new();

    for record in records {
        let (entry, exit) = days.entry(record.timestamp.date()).or_default();
        let time = record.timestamp.time();
        match record.kind {
            AttendanceKind::Entry => {
                if entry.is_none_or(|(earliest, _)| time < earliest) {
                    *entry = Some((time, record.punctuality));
                }
            }
            AttendanceKind::Exit => {
                if exit.is_none_or(|latest| time > latest) {
                    *exit = Some(time);
                }
            }
        }
    }

    days.into_iter()
        .rev()
        .map(|(day, (entry, exit))| {
            let entry_time = entry.map(|(time, _)| time);
            DaySummary {
                day,
                entry: entry_time,
                exit,
                worked: worked(entry_time, exit),
                punctuality: entry.map(|(_, punctuality)| punctuality),
            }
        })
        .collect()
}

fn worked(entry: Option<NaiveTime>, exit: Option<NaiveTime>) -> String {
    match (entry, exit) {
        (Some(entry), Some(exit)) if exit > entry => {
            let minutes = (exit - entry).num_minutes();
            format!("{:02}:{:02}", minutes / 60, minutes % 60)
        }
        _ => "00:00".to_string(),
    }
}

pub fn stats(days: &[DaySummary]) -> AttendanceStats {
    let on_time = days
        .iter()
        .filter(|d| d.punctuality == Some(Punctuality::OnTime))
        .count();
    let late = days
        .iter()
        .filter(|d| d.punctuality == Some(Punctuality::Late))
        .count();
    let on_time_percentage = if days.is_empty() {
        0
    } else {
        (on_time as f64 / days.len() as f64 * 100.0).round() as u32
    };

    AttendanceStats {
        days: days.len(),
        on_time,
        late,
        on_time_percentage,
    }
}
