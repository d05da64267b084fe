use std::time::Duration;

use gestu_core::endpoint;
use gestu_core::model::{
    Category, CategorySlug, Lesson, LessonDraft, LessonId, builtin_categories, builtin_lessons,
};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::CatalogError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Lesson row as served by the lesson API.
#[derive(Debug, Clone, Deserialize)]
pub struct LessonRecord {
    pub lesson_id: Option<u64>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub lesson_order: u32,
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRecord {
    pub slug: String,
    pub title: String,
    pub category_order: u32,
}

/// Lesson and category listings with a built-in fallback.
#[derive(Clone)]
pub struct LessonCatalog {
    client: reqwest::Client,
    base: Url,
    api_prefix: String,
}

impl LessonCatalog {
    #[must_use]
    pub fn new(base: Url, api_prefix: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base,
            api_prefix: api_prefix.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_url().clone(), config.api_prefix())
    }

    /// Lessons of `category` ordered by position; the built-in list if the
    /// backend is unreachable or has nothing usable.
    pub async fn lessons(&self, category: &CategorySlug) -> Vec<Lesson> {
        match self.fetch_lessons(category).await {
            Ok(lessons) => lessons,
            Err(err) => {
                warn!(category = %category, error = %err, "lesson catalog unavailable; using built-in lessons");
                builtin_lessons(category)
            }
        }
    }

    /// Fetch lessons from the backend only.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` on transport failures, non-2xx status, a body
    /// that does not parse, or an empty result.
    pub async fn fetch_lessons(&self, category: &CategorySlug) -> Result<Vec<Lesson>, CatalogError> {
        let mut url = endpoint::api_url(&self.base, &self.api_prefix, "lessons")?;
        url.query_pairs_mut()
            .append_pair("category", category.as_str());
        let records: Vec<LessonRecord> = self.get_json(url).await?;
        let lessons = lessons_from_records(category, records);
        if lessons.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(lessons)
    }

    /// Built-in categories, with titles and order overridden by the backend
    /// and backend-only categories appended.
    pub async fn categories(&self) -> Vec<Category> {
        match self.fetch_categories().await {
            Ok(remote) => merge_categories(builtin_categories(), remote),
            Err(err) => {
                warn!(error = %err, "category listing unavailable; using built-in categories");
                builtin_categories()
            }
        }
    }

    /// Fetch categories from the backend only.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` on transport failures, non-2xx status or a body
    /// that does not parse.
    pub async fn fetch_categories(&self) -> Result<Vec<CategoryRecord>, CatalogError> {
        let url = endpoint::api_url(&self.base, &self.api_prefix, "categories")?;
        self.get_json(url).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        debug!(%url, "catalog request");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::HttpStatus(status));
        }
        Ok(response.json().await?)
    }
}

/// Validate and sort API rows; rows that fail validation are skipped.
#[must_use]
pub fn lessons_from_records(category: &CategorySlug, records: Vec<LessonRecord>) -> Vec<Lesson> {
    let mut lessons: Vec<Lesson> = records
        .into_iter()
        .filter_map(|record| {
            let mut draft = LessonDraft::new(category.clone(), record.lesson_order, record.title);
            draft.id = record.lesson_id.map(LessonId::new);
            draft.description = record.description;
            draft.media_url = record.media_url;
            match draft.validate() {
                Ok(lesson) => Some(lesson),
                Err(err) => {
                    debug!(error = %err, "lesson row skipped");
                    None
                }
            }
        })
        .collect();
    lessons.sort_by_key(Lesson::order);
    lessons
}

fn merge_categories(mut merged: Vec<Category>, mut remote: Vec<CategoryRecord>) -> Vec<Category> {
    remote.sort_by_key(|record| record.category_order);
    for record in remote {
        let Ok(slug) = CategorySlug::new(&record.slug) else {
            debug!(slug = %record.slug, "category row skipped");
            continue;
        };
        match merged.iter_mut().find(|category| category.slug == slug) {
            Some(existing) => {
                existing.title = record.title;
                existing.order = record.category_order;
            }
            None => merged.push(Category {
                slug,
                title: record.title,
                order: record.category_order,
            }),
        }
    }
    merged.sort_by_key(|category| category.order);
    merged
}
