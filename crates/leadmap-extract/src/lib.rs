//! Extraction collaborator contracts + fixture-backed listing source.
//!
//! The live browser-driving extractor is an external collaborator; this
//! crate defines the contract the task engine consumes (request, outcome,
//! progress reporting, failure signaling) and ships a fixture-backed
//! implementation that parses a saved directory results page.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use leadmap_core::{clean_phone, clean_text, BusinessRecord};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub mod enrich;

pub const CRATE_NAME: &str = "leadmap-extract";

/// What to search for and how far to paginate. Defaults mirror the
/// service's home region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeRequest {
    pub search_term: String,
    pub location: String,
    pub category: String,
    pub max_pages: u32,
}

impl Default for ScrapeRequest {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            location: "UAE".to_string(),
            category: String::new(),
            max_pages: 5,
        }
    }
}

/// Callback a source uses to report `(task_id, progress 0-100, message)`
/// back to the task engine. Must be cheap and non-blocking.
pub type ProgressReporter = Arc<dyn Fn(Uuid, u8, &str) + Send + Sync>;

/// Successful extraction result: raw candidates (already stripped of
/// nameless entries) plus a suggested export basename.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub records: Vec<BusinessRecord>,
    pub suggested_basename: String,
    pub pages_visited: u32,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to load listing fixture: {0}")]
    Fixture(String),
    #[error("invalid selector: {0}")]
    Selector(String),
    #[error("{0}")]
    Message(String),
}

/// One registered scraper type. The task engine treats implementations as
/// opaque: they search, paginate up to `max_pages`, discard candidates
/// without a display name, and either return an outcome or fail outright.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    async fn scrape(
        &self,
        request: &ScrapeRequest,
        task_id: Uuid,
        progress: &ProgressReporter,
    ) -> Result<ScrapeOutcome, ExtractError>;
}

/// Row shape for the "list available scrapers" API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

/// Name -> source lookup. Registered once at startup; read-only afterwards.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: BTreeMap<&'static str, Arc<dyn ListingSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn ListingSource>) {
        self.sources.insert(source.name(), source);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ListingSource>> {
        self.sources.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        self.sources
            .values()
            .map(|s| SourceDescriptor {
                name: s.name().to_string(),
                display_name: s.display_name().to_string(),
                description: s.description().to_string(),
            })
            .collect()
    }
}

/// Turns a search term into a filename-safe fragment.
pub fn slugify(input: &str) -> String {
    let slug = input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "businesses".to_string()
    } else {
        slug
    }
}

/// Listing source backed by a saved directory results page. Pages are
/// `section.results-page` elements; each business is an `article.place-card`.
///
/// Optionally looks up an e-mail address on the business website for cards
/// that carry a website link but no e-mail node.
pub struct FixtureListingSource {
    html: String,
    site_label: &'static str,
    website_lookup: Option<reqwest::Client>,
}

impl FixtureListingSource {
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            site_label: "maps-directory",
            website_lookup: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let html = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ExtractError::Fixture(e.to_string()))?;
        Ok(Self::from_html(html))
    }

    /// Enables fetching business websites to fill in missing e-mails.
    pub fn with_website_lookup(mut self, client: reqwest::Client) -> Self {
        self.website_lookup = Some(client);
        self
    }

    fn matches_request(record: &BusinessRecord, request: &ScrapeRequest) -> bool {
        let haystack = format!(
            "{} {}",
            record.business_name.as_deref().unwrap_or_default(),
            record.category.as_deref().unwrap_or_default()
        )
        .to_lowercase();
        let term_ok = request.search_term.is_empty()
            || haystack.contains(&request.search_term.to_lowercase());
        let category_ok = request.category.is_empty()
            || record
                .category
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
                .contains(&request.category.to_lowercase());
        term_ok && category_ok
    }

    /// Synchronous parse pass. `Html` is not `Send`, so all document work
    /// happens here before any await point.
    fn parse_pages(
        &self,
        request: &ScrapeRequest,
    ) -> Result<(Vec<BusinessRecord>, u32), ExtractError> {
        let parse_selector = |raw: &str| {
            Selector::parse(raw).map_err(|e| ExtractError::Selector(e.to_string()))
        };
        let page_sel = parse_selector("section.results-page")?;
        let card_sel = parse_selector("article.place-card")?;
        let name_sel = parse_selector(".place-name")?;
        let category_sel = parse_selector(".place-category")?;
        let address_sel = parse_selector(".place-address")?;
        let phone_sel = parse_selector(".place-phone")?;
        let website_sel = parse_selector("a.place-website")?;
        let email_sel = parse_selector(".place-email")?;

        let document = Html::parse_document(&self.html);

        let first_text = |card: &ElementRef, sel: &Selector| -> Option<String> {
            card.select(sel)
                .next()
                .map(|n| clean_text(&n.text().collect::<String>()))
                .filter(|t| !t.is_empty())
        };

        let mut records = Vec::new();
        let mut pages_visited = 0u32;

        let pages: Vec<ElementRef> = document.select(&page_sel).collect();
        for page in pages.into_iter().take(request.max_pages.max(1) as usize) {
            pages_visited += 1;
            for card in page.select(&card_sel) {
                let Some(name) = first_text(&card, &name_sel) else {
                    // Nameless candidates never leave the extractor.
                    continue;
                };
                let mobile = first_text(&card, &phone_sel).map(|p| clean_phone(&p));
                let website = card
                    .select(&website_sel)
                    .next()
                    .and_then(|n| n.value().attr("href"))
                    .map(|href| clean_text(href))
                    .filter(|href| !href.is_empty());
                let email = first_text(&card, &email_sel)
                    .or_else(|| enrich::email_from_html(&card.html()));

                let record = BusinessRecord {
                    business_name: Some(name),
                    category: first_text(&card, &category_sel),
                    location: first_text(&card, &address_sel)
                        .or_else(|| Some(request.location.clone())),
                    whatsapp: mobile.clone(),
                    mobile,
                    email,
                    website,
                    source_url: None,
                    source_site: Some(self.site_label.to_string()),
                };
                if Self::matches_request(&record, request) {
                    records.push(record);
                }
            }
        }

        Ok((records, pages_visited))
    }
}

#[async_trait]
impl ListingSource for FixtureListingSource {
    fn name(&self) -> &'static str {
        "maps"
    }

    fn display_name(&self) -> &'static str {
        "Maps Directory UAE"
    }

    fn description(&self) -> &'static str {
        "High-quality verified business leads from the maps directory"
    }

    async fn scrape(
        &self,
        request: &ScrapeRequest,
        task_id: Uuid,
        progress: &ProgressReporter,
    ) -> Result<ScrapeOutcome, ExtractError> {
        progress(task_id, 10, "Setting up listing source...");
        progress(task_id, 55, "Loading business listings...");

        let (mut records, pages_visited) = self.parse_pages(request)?;

        if let Some(client) = &self.website_lookup {
            for record in &mut records {
                if record.email.is_none() {
                    if let Some(website) = record.website.clone() {
                        record.email = enrich::fetch_email(client, &website).await;
                    }
                }
            }
        }

        progress(task_id, 90, "Preparing export...");
        Ok(ScrapeOutcome {
            records,
            suggested_basename: format!("maps_{}", slugify(&request.search_term)),
            pages_visited,
        })
    }
}
