use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{CategorySlug, LessonId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson order must start at 1, got {order}")]
    InvalidOrder { order: u32 },

    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("lesson target word cannot be empty")]
    EmptyTargetWord,

    #[error("completion key cannot be empty")]
    EmptyCompletionKey,
}

//
// ─── COMPLETION KEY ────────────────────────────────────────────────────────────
//

/// Canonical string identity of a lesson for progress tracking.
///
/// A backend lesson id renders as its decimal value; lessons without one use
/// `category:order`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionKey(String);

impl CompletionKey {
    /// Build a key from an arbitrary stored string.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::EmptyCompletionKey` if the trimmed value is empty.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, LessonError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(LessonError::EmptyCompletionKey);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn from_lesson_id(id: LessonId) -> Self {
        Self(id.to_string())
    }

    #[must_use]
    pub fn positional(category: &CategorySlug, order: u32) -> Self {
        Self(format!("{category}:{order}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CompletionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompletionKey({})", self.0)
    }
}

impl fmt::Display for CompletionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// Unvalidated lesson fields, as received from the catalog or built-in lists.
#[derive(Clone, Debug)]
pub struct LessonDraft {
    pub id: Option<LessonId>,
    pub category: CategorySlug,
    pub order: u32,
    pub title: String,
    /// Falls back to `title` when absent.
    pub target_word: Option<String>,
    pub media_url: Option<String>,
    pub description: Option<String>,
}

impl LessonDraft {
    #[must_use]
    pub fn new(category: CategorySlug, order: u32, title: impl Into<String>) -> Self {
        Self {
            id: None,
            category,
            order,
            title: title.into(),
            target_word: None,
            media_url: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: LessonId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_target_word(mut self, word: impl Into<String>) -> Self {
        self.target_word = Some(word.into());
        self
    }

    #[must_use]
    pub fn with_media_url(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }

    /// Validate the draft into an immutable `Lesson`.
    ///
    /// # Errors
    ///
    /// Returns `LessonError` if the order is zero or the title/target word is blank.
    pub fn validate(self) -> Result<Lesson, LessonError> {
        if self.order == 0 {
            return Err(LessonError::InvalidOrder { order: self.order });
        }
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        let target_word = match normalize_optional(self.target_word) {
            Some(word) => word,
            None => title.clone(),
        };
        if target_word.is_empty() {
            return Err(LessonError::EmptyTargetWord);
        }

        Ok(Lesson {
            id: self.id,
            category: self.category,
            order: self.order,
            title,
            target_word,
            media_url: normalize_optional(self.media_url),
            description: normalize_optional(self.description),
        })
    }
}

/// A single instructional clip within a category, immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lesson {
    id: Option<LessonId>,
    category: CategorySlug,
    order: u32,
    title: String,
    target_word: String,
    media_url: Option<String>,
    description: Option<String>,
}

impl Lesson {
    #[must_use]
    pub fn id(&self) -> Option<LessonId> {
        self.id
    }

    #[must_use]
    pub fn category(&self) -> &CategorySlug {
        &self.category
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn target_word(&self) -> &str {
        &self.target_word
    }

    #[must_use]
    pub fn media_url(&self) -> Option<&str> {
        self.media_url.as_deref()
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The key written when this lesson is completed: backend id if known,
    /// otherwise `category:order`.
    #[must_use]
    pub fn completion_key(&self) -> CompletionKey {
        match self.id {
            Some(id) => CompletionKey::from_lesson_id(id),
            None => CompletionKey::positional(&self.category, self.order),
        }
    }

    /// Every key under which this lesson's completion may have been stored.
    ///
    /// Readers must check all of them; older writers used the positional key
    /// even when a backend id existed.
    #[must_use]
    pub fn completion_keys(&self) -> Vec<CompletionKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(id) = self.id {
            keys.push(CompletionKey::from_lesson_id(id));
        }
        keys.push(CompletionKey::positional(&self.category, self.order));
        keys
    }

    /// Two lessons share progress iff their key sets intersect.
    #[must_use]
    pub fn shares_progress_with(&self, other: &Lesson) -> bool {
        let theirs = other.completion_keys();
        self.completion_keys().iter().any(|key| theirs.contains(key))
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
