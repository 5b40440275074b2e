//! Core domain model for the FS-UMI news pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "fsumi-core";

/// One scraped news item. `title` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub link: String,
    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl NewsRecord {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date: String::new(),
            link: link.into(),
            image_url: None,
            categories: Vec::new(),
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        let image_url = image_url.into();
        self.image_url = if image_url.is_empty() { None } else { Some(image_url) };
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Counters gathered by one completed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub known: usize,
    pub fetched: usize,
    pub failed_pages: usize,
    pub total: usize,
    pub new: usize,
    pub store_updated: bool,
    pub backup_written: bool,
}

/// Ephemeral result of one scheduler invocation; only ever logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub total: usize,
    pub new: usize,
    pub store_updated: bool,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            total: 0,
            new: 0,
            store_updated: false,
            error: Some(error.into()),
        }
    }
}

impl From<&RunSummary> for RunOutcome {
    fn from(summary: &RunSummary) -> Self {
        Self {
            success: true,
            total: summary.total,
            new: summary.new,
            store_updated: summary.store_updated,
            error: None,
        }
    }
}
