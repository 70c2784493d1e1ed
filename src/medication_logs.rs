//! Per-date medication log cache.
//!
//! Each date key maps to the logs scheduled on that calendar date. A
//! populated date is served from memory until it is force-refreshed,
//! invalidated, evicted, or updated optimistically. The cache holds at
//! most `capacity` dates; the least recently used date is evicted first.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use lru::LruCache;

use crate::api::{ApiError, MedicationLogApi};
use crate::models::MedicationLog;

struct LogState {
    cache: LruCache<NaiveDate, Vec<MedicationLog>>,
    loading: HashSet<NaiveDate>,
    errors: HashMap<NaiveDate, String>,
}

pub struct MedicationLogStore {
    api: Arc<dyn MedicationLogApi>,
    state: Mutex<LogState>,
}

/// Clears loading flags when a fetch finishes, however it finishes.
struct LoadingGuard<'a> {
    store: &'a MedicationLogStore,
    dates: Vec<NaiveDate>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.store.lock();
        for date in &self.dates {
            state.loading.remove(date);
        }
    }
}

impl MedicationLogStore {
    pub fn new(api: Arc<dyn MedicationLogApi>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            api,
            state: Mutex::new(LogState {
                cache: LruCache::new(capacity),
                loading: HashSet::new(),
                errors: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_loading(&self, dates: Vec<NaiveDate>) -> LoadingGuard<'_> {
        let mut state = self.lock();
        for date in &dates {
            state.loading.insert(*date);
        }
        LoadingGuard { store: self, dates }
    }

    /// Logs for one date, from cache unless `force` or the date is
    /// missing or still loading.
    pub async fn fetch_logs_by_date(
        &self,
        date: NaiveDate,
        force: bool,
    ) -> Result<Vec<MedicationLog>, ApiError> {
        if !force {
            let mut state = self.lock();
            if !state.loading.contains(&date) {
                if let Some(logs) = state.cache.get(&date) {
                    tracing::debug!(%date, count = logs.len(), "Medication logs cache hit");
                    return Ok(logs.clone());
                }
            }
        }

        let _loading = self.begin_loading(vec![date]);
        match self.api.fetch_by_date(date).await {
            Ok(logs) => {
                let mut state = self.lock();
                state.errors.remove(&date);
                state.cache.put(date, logs.clone());
                tracing::debug!(%date, count = logs.len(), "Medication logs fetched");
                Ok(logs)
            }
            Err(e) => {
                tracing::warn!(%date, error = %e, "Medication log fetch failed");
                self.lock().errors.insert(date, e.user_message());
                Err(e)
            }
        }
    }

    /// Fetch an inclusive date range in one call and bucket the records
    /// by date. Dates without records are cached as empty.
    pub async fn fetch_logs_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MedicationLog>, ApiError> {
        if start > end {
            return Ok(Vec::new());
        }
        let dates: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();

        let _loading = self.begin_loading(dates.clone());
        let logs = match self.api.fetch_by_range(start, end).await {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(%start, %end, error = %e, "Medication log range fetch failed");
                let message = e.user_message();
                let mut state = self.lock();
                for date in &dates {
                    state.errors.insert(*date, message.clone());
                }
                return Err(e);
            }
        };

        // Inserted oldest first, so when the range outgrows the cache the
        // latest dates survive.
        let mut buckets: BTreeMap<NaiveDate, Vec<MedicationLog>> =
            dates.iter().map(|d| (*d, Vec::new())).collect();
        for log in &logs {
            buckets.entry(log.date_key()).or_default().push(log.clone());
        }

        let mut state = self.lock();
        for (date, bucket) in buckets {
            state.errors.remove(&date);
            state.cache.put(date, bucket);
        }
        tracing::debug!(%start, %end, count = logs.len(), "Medication log range cached");
        Ok(logs)
    }

    /// Apply a log change locally, keyed by the log's own scheduled date.
    /// Replaces the entry with the same id (or schedule id), otherwise
    /// appends. A date that was never fetched stays uncached; a one-entry
    /// bucket would hide the rest of that day from the next read.
    pub fn update_log(&self, log: MedicationLog) {
        let date = log.date_key();
        let mut state = self.lock();
        let Some(bucket) = state.cache.get_mut(&date) else {
            tracing::debug!(%date, "Log update for an uncached date; left for the next fetch");
            return;
        };
        match bucket.iter_mut().find(|existing| existing.same_entry(&log)) {
            Some(existing) => *existing = log,
            None => bucket.push(log),
        }
    }

    pub fn logs_for(&self, date: NaiveDate) -> Option<Vec<MedicationLog>> {
        self.lock().cache.get(&date).cloned()
    }

    pub fn is_loading(&self, date: NaiveDate) -> bool {
        self.lock().loading.contains(&date)
    }

    pub fn error_for(&self, date: NaiveDate) -> Option<String> {
        self.lock().errors.get(&date).cloned()
    }

    /// Forget one date so the next read refetches it.
    pub fn invalidate(&self, date: NaiveDate) {
        let mut state = self.lock();
        state.cache.pop(&date);
        state.errors.remove(&date);
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.cache.clear();
        state.errors.clear();
    }

    pub fn cached_dates(&self) -> usize {
        self.lock().cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Datelike;

    use crate::models::LogStatus;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn log(id: Option<i64>, schedule_id: i64, d: u32, status: LogStatus) -> MedicationLog {
        MedicationLog {
            id,
            schedule_id,
            medication_id: Some(1),
            medication_name: "Metformin".into(),
            scheduled_at: day(d).and_hms_opt(8, 0, 0).unwrap(),
            taken_at: None,
            status,
            member_id: None,
        }
    }

    #[derive(Default)]
    struct CountingApi {
        by_date: AtomicUsize,
        by_range: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MedicationLogApi for CountingApi {
        async fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<MedicationLog>, ApiError> {
            self.by_date.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ApiError::from_status(500, ""));
            }
            Ok(vec![log(Some(1), 10, date.day(), LogStatus::Pending)])
        }

        async fn fetch_by_range(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<MedicationLog>, ApiError> {
            self.by_range.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                log(Some(1), 10, 1, LogStatus::Taken),
                log(Some(2), 11, 1, LogStatus::Missed),
                log(Some(3), 10, 3, LogStatus::Pending),
            ])
        }
    }

    fn store(api: &Arc<CountingApi>, capacity: usize) -> MedicationLogStore {
        MedicationLogStore::new(api.clone(), capacity)
    }

    #[tokio::test]
    async fn second_unforced_fetch_hits_cache() {
        let api = Arc::new(CountingApi::default());
        let store = store(&api, 62);

        store.fetch_logs_by_date(day(1), false).await.unwrap();
        let cached = store.fetch_logs_by_date(day(1), false).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(api.by_date.load(Ordering::SeqCst), 1);
        assert!(!store.is_loading(day(1)));
    }

    #[tokio::test]
    async fn force_always_fetches() {
        let api = Arc::new(CountingApi::default());
        let store = store(&api, 62);

        store.fetch_logs_by_date(day(1), false).await.unwrap();
        store.fetch_logs_by_date(day(1), true).await.unwrap();
        store.fetch_logs_by_date(day(1), true).await.unwrap();
        assert_eq!(api.by_date.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_records_error_and_clears_loading() {
        let api = Arc::new(CountingApi {
            fail: true,
            ..CountingApi::default()
        });
        let store = store(&api, 62);

        assert!(store.fetch_logs_by_date(day(2), false).await.is_err());
        assert!(!store.is_loading(day(2)));
        assert!(store.error_for(day(2)).is_some());
        assert!(store.logs_for(day(2)).is_none());
    }

    #[tokio::test]
    async fn range_buckets_by_date_and_fills_gaps() {
        let api = Arc::new(CountingApi::default());
        let store = store(&api, 62);

        let all = store.fetch_logs_by_range(day(1), day(4)).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(api.by_range.load(Ordering::SeqCst), 1);

        assert_eq!(store.logs_for(day(1)).unwrap().len(), 2);
        assert_eq!(store.logs_for(day(2)).unwrap().len(), 0);
        assert_eq!(store.logs_for(day(3)).unwrap().len(), 1);
        assert_eq!(store.logs_for(day(4)).unwrap().len(), 0);

        // Served from the range result.
        store.fetch_logs_by_date(day(2), false).await.unwrap();
        assert_eq!(api.by_date.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn update_replaces_by_id_or_schedule_and_appends() {
        let api = Arc::new(CountingApi::default());
        let store = store(&api, 62);
        store.fetch_logs_by_range(day(1), day(1)).await.unwrap();

        store.update_log(log(Some(2), 11, 1, LogStatus::Taken));
        store.update_log(log(None, 10, 1, LogStatus::Skipped));
        store.update_log(log(None, 99, 1, LogStatus::Pending));

        let logs = store.logs_for(day(1)).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].status, LogStatus::Skipped);
        assert_eq!(logs[1].status, LogStatus::Taken);
        assert_eq!(logs[2].schedule_id, 99);
    }

    #[tokio::test]
    async fn update_without_bucket_leaves_date_unfetched() {
        let api = Arc::new(CountingApi::default());
        let store = store(&api, 62);
        store.update_log(log(Some(5), 12, 9, LogStatus::Taken));
        assert!(store.logs_for(day(9)).is_none());
        assert_eq!(store.cached_dates(), 0);

        let logs = store.fetch_logs_by_date(day(9), false).await.unwrap();
        assert_eq!(api.by_date.load(Ordering::SeqCst), 1);
        assert_eq!(logs[0].schedule_id, 10);
    }

    #[tokio::test]
    async fn range_beyond_capacity_keeps_latest_dates() {
        let api = Arc::new(CountingApi::default());
        let store = store(&api, 3);

        store.fetch_logs_by_range(day(1), day(5)).await.unwrap();

        assert_eq!(store.cached_dates(), 3);
        assert!(store.logs_for(day(1)).is_none());
        assert!(store.logs_for(day(2)).is_none());
        assert_eq!(store.logs_for(day(3)).unwrap().len(), 1);
        assert!(store.logs_for(day(4)).is_some());
        assert!(store.logs_for(day(5)).is_some());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recent_date() {
        let api = Arc::new(CountingApi::default());
        let store = store(&api, 2);

        store.fetch_logs_by_date(day(1), false).await.unwrap();
        store.fetch_logs_by_date(day(2), false).await.unwrap();
        store.logs_for(day(1));
        store.fetch_logs_by_date(day(3), false).await.unwrap();

        assert_eq!(store.cached_dates(), 2);
        assert!(store.logs_for(day(2)).is_none());
        assert!(store.logs_for(day(1)).is_some());
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let api = Arc::new(CountingApi::default());
        let store = store(&api, 62);
        store.fetch_logs_by_date(day(1), false).await.unwrap();
        store.invalidate(day(1));
        store.fetch_logs_by_date(day(1), false).await.unwrap();
        assert_eq!(api.by_date.load(Ordering::SeqCst), 2);

        store.clear();
        assert_eq!(store.cached_dates(), 0);
    }
}
