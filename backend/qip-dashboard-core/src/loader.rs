// src/loader.rs
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::model::Employee;
use crate::normalize::normalize_employee_list;
use crate::period::Period;
use crate::store::{
    employees_path, summary_path, DocumentStore, StoreAuth, StoreError, EMPLOYEES_COLLECTION,
    SUMMARY_COLLECTION, THRESHOLDS_COLLECTION,
};
use crate::summary::Summary;
use crate::thresholds::{self, SaveError, SaveOutcome, ThresholdForm, Thresholds};

/// User-visible notice that part of the page is running on fallback data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Banner {
    pub source: String,
    pub message: String,
}

impl Banner {
    fn new(source: &str, message: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            message: message.into(),
        }
    }
}

/// Everything the views need for one period. Building it never fails.
#[derive(Debug, Clone)]
pub struct LoadedPeriod {
    pub period: Period,
    pub employees: Arc<Vec<Employee>>,
    pub summary: Summary,
    pub thresholds: Thresholds,
    pub banners: Vec<Banner>,
}

impl LoadedPeriod {
    pub fn employee(&self, emp_no: &str) -> Option<&Employee> {
        let wanted = emp_no.trim();
        self.employees.iter().find(|e| e.emp_no == wanted)
    }
}

#[derive(Debug, Clone)]
enum Cached {
    Employees(Arc<Vec<Employee>>),
    Summary(Option<Summary>),
    Thresholds(Thresholds),
}

type CacheKey = (&'static str, Period);

pub struct DashboardLoader {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    cache: TtlCache<CacheKey, Cached>,
}

impl DashboardLoader {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        cache_ttl_secs: u64,
        cache_max_entries: usize,
    ) -> Self {
        Self {
            store,
            cache: TtlCache::new(cache_ttl_secs, cache_max_entries, clock.clone()),
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Fetches employees, summary and thresholds concurrently. A failed fetch
    /// falls back to empty or default data and leaves a banner behind.
    pub async fn load_all(&self, period: Period, auth: &StoreAuth) -> LoadedPeriod {
        let (employees, summary, thresholds) = tokio::join!(
            self.load_employees(period, auth),
            self.load_summary(period, auth),
            self.load_thresholds(period, auth),
        );

        let mut banners = Vec::new();

        let employees = match employees {
            Ok(Some(list)) => list,
            Ok(None) => {
                banners.push(Banner::new(
                    EMPLOYEES_COLLECTION,
                    format!("No employee data has been uploaded for {}", period.label()),
                ));
                Arc::new(Vec::new())
            }
            Err(e) => {
                warn!("Employee load failed for {}: {}", period, e);
                banners.push(Banner::new(
                    EMPLOYEES_COLLECTION,
                    format!("Employee data could not be loaded: {}", e),
                ));
                Arc::new(Vec::new())
            }
        };

        let thresholds = thresholds.unwrap_or_else(|e| {
            warn!("Threshold load failed for {}: {}", period, e);
            banners.push(Banner::new(
                THRESHOLDS_COLLECTION,
                format!("Thresholds could not be loaded, showing defaults: {}", e),
            ));
            Thresholds::default()
        });

        let summary = match summary {
            Ok(Some(stored)) => stored,
            Ok(None) => Summary::from_employees(&employees, &thresholds),
            Err(e) => {
                warn!("Summary load failed for {}: {}", period, e);
                banners.push(Banner::new(
                    SUMMARY_COLLECTION,
                    format!("Summary could not be loaded, recomputed from records: {}", e),
                ));
                Summary::from_employees(&employees, &thresholds)
            }
        };

        info!(
            "Loaded {}: {} employees, {} banner(s)",
            period,
            employees.len(),
            banners.len()
        );

        LoadedPeriod {
            period,
            employees,
            summary,
            thresholds,
            banners,
        }
    }

    async fn load_employees(
        &self,
        period: Period,
        auth: &StoreAuth,
    ) -> Result<Option<Arc<Vec<Employee>>>, StoreError> {
        let key = (EMPLOYEES_COLLECTION, period);
        if let Some(Cached::Employees(list)) = self.cache.get(&key) {
            return Ok(Some(list));
        }
        let Some(document) = self
            .store
            .get_document(&employees_path(&period.to_string()), auth)
            .await?
        else {
            return Ok(None);
        };
        let list = Arc::new(normalize_employee_list(&document));
        debug!("Normalized {} employee records for {}", list.len(), period);
        self.cache.insert(key, Cached::Employees(list.clone()));
        Ok(Some(list))
    }

    async fn load_summary(
        &self,
        period: Period,
        auth: &StoreAuth,
    ) -> Result<Option<Summary>, StoreError> {
        let key = (SUMMARY_COLLECTION, period);
        if let Some(Cached::Summary(summary)) = self.cache.get(&key) {
            return Ok(summary);
        }
        let summary = self
            .store
            .get_document(&summary_path(&period.to_string()), auth)
            .await?
            .map(|doc| Summary::from_document(&doc));
        self.cache.insert(key, Cached::Summary(summary.clone()));
        Ok(summary)
    }

    async fn load_thresholds(
        &self,
        period: Period,
        auth: &StoreAuth,
    ) -> Result<Thresholds, StoreError> {
        let key = (THRESHOLDS_COLLECTION, period);
        if let Some(Cached::Thresholds(thresholds)) = self.cache.get(&key) {
            return Ok(thresholds);
        }
        let (thresholds, _) = thresholds::read_thresholds(self.store.as_ref(), auth, &period).await?;
        self.cache.insert(key, Cached::Thresholds(thresholds.clone()));
        Ok(thresholds)
    }

    /// Saves the admin form and drops everything cached for the period, since
    /// the summary and incentive views are derived from the thresholds.
    pub async fn save_thresholds(
        &self,
        period: Period,
        form: &ThresholdForm,
        editor: &str,
        auth: &StoreAuth,
    ) -> Result<SaveOutcome, SaveError> {
        let outcome = thresholds::save_thresholds(
            self.store.as_ref(),
            auth,
            &period,
            form,
            editor,
            self.clock.as_ref(),
        )
        .await?;
        if outcome.entry.is_some() {
            self.invalidate_period(period);
        }
        Ok(outcome)
    }

    /// Thresholds as the admin form should show them, bypassing the cache.
    pub async fn current_thresholds(
        &self,
        period: Period,
        auth: &StoreAuth,
    ) -> Result<Thresholds, StoreError> {
        thresholds::read_thresholds(self.store.as_ref(), auth, &period)
            .await
            .map(|(thresholds, _)| thresholds)
    }

    pub fn invalidate_period(&self, period: Period) {
        for collection in [EMPLOYEES_COLLECTION, SUMMARY_COLLECTION, THRESHOLDS_COLLECTION] {
            self.cache.invalidate(&(collection, period));
        }
    }
}
