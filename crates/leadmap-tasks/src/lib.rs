//! Task store and lifecycle engine: creates scrape tasks, runs them as
//! background units, and folds their results into exports and stats.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use leadmap_core::DedupCollector;
use leadmap_export::ExportStore;
use leadmap_extract::{
    ListingSource, ProgressReporter, ScrapeRequest, SourceDescriptor, SourceRegistry,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

pub mod stats;

pub use stats::{ScraperStat, StatsAggregator};

pub const CRATE_NAME: &str = "leadmap-tasks";

/// Lifecycle of one scrape task: pending -> running -> completed | failed.
/// Terminal states are absorbing; there is no cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Which stage broke when a task failed. Kept beside the human-readable
/// message so tests and clients need not parse text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Extraction,
    Export,
}

/// One asynchronous scrape job. Each task record is written only by its
/// own background unit (plus the store at creation), so status reads need
/// no coordination beyond the shared map lock.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeTask {
    pub id: Uuid,
    pub scraper: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub filename: Option<String>,
    pub total_records: u64,
    pub failure: Option<FailureKind>,
}

/// Submit-time parameters; absent fields fall back to the request defaults
/// (empty term/category, home region, five pages).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeParams {
    pub search_term: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub max_pages: Option<u32>,
}

impl ScrapeParams {
    pub fn into_request(self) -> ScrapeRequest {
        let defaults = ScrapeRequest::default();
        ScrapeRequest {
            search_term: self.search_term.unwrap_or(defaults.search_term),
            location: self.location.unwrap_or(defaults.location),
            category: self.category.unwrap_or(defaults.category),
            max_pages: self.max_pages.unwrap_or(defaults.max_pages),
        }
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("unknown scraper: {0}")]
    UnknownScraper(String),
}

/// On-demand rollup over the task table plus the per-scraper aggregates.
/// `total_records` is derived from completed tasks — the task table is
/// authoritative, the aggregate set a secondary rollup.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub running_tasks: usize,
    pub failed_tasks: usize,
    pub total_records: u64,
    pub stats: Vec<ScraperStat>,
}

#[derive(Default)]
struct TaskTable {
    tasks: HashMap<Uuid, ScrapeTask>,
    order: Vec<Uuid>,
}

struct StoreInner {
    table: RwLock<TaskTable>,
    stats: StatsAggregator,
    registry: SourceRegistry,
    exports: ExportStore,
}

/// Long-lived owner of all task and stat state. Created once at process
/// start; clones share the same state.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<StoreInner>,
}

impl TaskStore {
    pub fn new(registry: SourceRegistry, exports: ExportStore) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                table: RwLock::new(TaskTable::default()),
                stats: StatsAggregator::new(),
                registry,
                exports,
            }),
        }
    }

    pub fn exports(&self) -> &ExportStore {
        &self.inner.exports
    }

    /// Registers a pending task and schedules its run as a background
    /// unit. Returns before execution begins. An unregistered scraper
    /// type fails here, synchronously, with no task created.
    pub fn start_scraping(
        &self,
        scraper: &str,
        params: ScrapeParams,
    ) -> Result<Uuid, TaskError> {
        let source = self
            .inner
            .registry
            .get(scraper)
            .ok_or_else(|| TaskError::UnknownScraper(scraper.to_string()))?;

        let task_id = Uuid::new_v4();
        let task = ScrapeTask {
            id: task_id,
            scraper: scraper.to_string(),
            status: TaskStatus::Pending,
            progress: 0,
            message: "Initializing...".to_string(),
            created_at: Utc::now(),
            completed_at: None,
            filename: None,
            total_records: 0,
            failure: None,
        };

        {
            let mut table = self.inner.table.write().expect("task table lock");
            table.tasks.insert(task_id, task);
            table.order.push(task_id);
        }

        info!(%task_id, scraper, "scrape task created");
        let store = self.clone();
        tokio::spawn(async move {
            store.run(task_id, source, params).await;
        });

        Ok(task_id)
    }

    pub fn get_task(&self, task_id: Uuid) -> Option<ScrapeTask> {
        self.inner
            .table
            .read()
            .expect("task table lock")
            .tasks
            .get(&task_id)
            .cloned()
    }

    /// All tasks in insertion order.
    pub fn list_tasks(&self) -> Vec<ScrapeTask> {
        let table = self.inner.table.read().expect("task table lock");
        table
            .order
            .iter()
            .filter_map(|id| table.tasks.get(id).cloned())
            .collect()
    }

    pub fn list_sources(&self) -> Vec<SourceDescriptor> {
        self.inner.registry.descriptors()
    }

    pub fn daily_stats(&self) -> Vec<ScraperStat> {
        self.inner.stats.entries()
    }

    pub fn summary(&self) -> StatsSummary {
        let table = self.inner.table.read().expect("task table lock");
        let mut completed_tasks = 0;
        let mut running_tasks = 0;
        let mut failed_tasks = 0;
        let mut total_records = 0u64;
        for task in table.tasks.values() {
            match task.status {
                TaskStatus::Completed => {
                    completed_tasks += 1;
                    total_records += task.total_records;
                }
                TaskStatus::Running => running_tasks += 1,
                TaskStatus::Failed => failed_tasks += 1,
                TaskStatus::Pending => {}
            }
        }
        StatsSummary {
            total_tasks: table.tasks.len(),
            completed_tasks,
            running_tasks,
            failed_tasks,
            total_records,
            stats: self.inner.stats.entries(),
        }
    }

    /// The background unit. Every path ends in a terminal state; errors
    /// never escape this boundary.
    async fn run(&self, task_id: Uuid, source: Arc<dyn ListingSource>, params: ScrapeParams) {
        self.with_task(task_id, |task| {
            task.status = TaskStatus::Running;
            task.message = "Starting scraper...".to_string();
        });

        let reporter: ProgressReporter = {
            let store = self.clone();
            Arc::new(move |tid, progress, message: &str| {
                store.report_progress(tid, progress, message);
            })
        };

        let request = params.into_request();
        let outcome = match source.scrape(&request, task_id, &reporter).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(%task_id, %err, "extraction failed");
                self.fail(task_id, FailureKind::Extraction, &err.to_string());
                return;
            }
        };

        let mut collector = DedupCollector::new();
        for record in outcome.records {
            collector.offer(record);
        }
        let records = collector.into_records();
        let total = records.len() as u64;

        let basename = self
            .inner
            .exports
            .timestamped_basename(&outcome.suggested_basename);
        let files = match self.inner.exports.write_records(&basename, &records) {
            Ok(files) => files,
            Err(err) => {
                error!(%task_id, %err, "export failed");
                self.fail(task_id, FailureKind::Export, &err.to_string());
                return;
            }
        };

        self.with_task(task_id, |task| {
            task.status = TaskStatus::Completed;
            task.progress = 100;
            task.message = format!("Completed! Found {total} businesses");
            task.completed_at = Some(Utc::now());
            task.filename = Some(files.basename.clone());
            task.total_records = total;
        });
        self.inner
            .stats
            .record_run(source.name(), source.display_name(), total);
        info!(%task_id, total, basename = %files.basename, "scrape task completed");
    }

    /// Last-write-wins progress update; ignored once the task is terminal
    /// or unknown.
    fn report_progress(&self, task_id: Uuid, progress: u8, message: &str) {
        self.with_task(task_id, |task| {
            if task.status.is_terminal() {
                return;
            }
            task.progress = progress.min(100);
            task.message = message.to_string();
        });
    }

    fn fail(&self, task_id: Uuid, kind: FailureKind, message: &str) {
        self.with_task(task_id, |task| {
            task.status = TaskStatus::Failed;
            task.message = format!("Error: {message}");
            task.failure = Some(kind);
            task.completed_at = Some(Utc::now());
        });
    }

    fn with_task(&self, task_id: Uuid, mutate: impl FnOnce(&mut ScrapeTask)) {
        let mut table = self.inner.table.write().expect("task table lock");
        if let Some(task) = table.tasks.get_mut(&task_id) {
            mutate(task);
        }
    }
}
