//! Running per-scraper totals across completed runs.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cumulative aggregate for one scraper type. Created lazily on its first
/// completed run, then updated in place.
#[derive(Debug, Clone, Serialize)]
pub struct ScraperStat {
    pub scraper: String,
    pub display_name: String,
    pub total_records: u64,
    pub runs: u64,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct StatsAggregator {
    entries: RwLock<Vec<ScraperStat>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one completed run into the aggregate for `scraper`.
    pub fn record_run(&self, scraper: &str, display_name: &str, records_found: u64) {
        let mut entries = self.entries.write().expect("stats lock");
        match entries.iter_mut().find(|s| s.scraper == scraper) {
            Some(stat) => {
                stat.total_records += records_found;
                stat.runs += 1;
                stat.last_run = Some(Utc::now());
            }
            None => entries.push(ScraperStat {
                scraper: scraper.to_string(),
                display_name: display_name.to_string(),
                total_records: records_found,
                runs: 1,
                last_run: Some(Utc::now()),
            }),
        }
    }

    pub fn entries(&self) -> Vec<ScraperStat> {
        self.entries.read().expect("stats lock").clone()
    }
}
