use std::collections::BTreeSet;

use serde_json::Value;

use crate::model::{CompletionKey, Lesson};

/// The persisted set of completed lessons.
///
/// Keys stay until explicitly removed; there is no expiry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressSet {
    keys: BTreeSet<CompletionKey>,
}

impl ProgressSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = CompletionKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Decode the stored JSON array.
    ///
    /// Absent, malformed or non-array data yields an empty set. String entries
    /// are trimmed, numeric entries (legacy backend ids) become their decimal
    /// form, anything else is skipped.
    #[must_use]
    pub fn decode_lenient(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::new();
        };
        let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) else {
            return Self::new();
        };

        let keys = items.into_iter().filter_map(|item| match item {
            Value::String(s) => CompletionKey::new(s).ok(),
            Value::Number(n) => CompletionKey::new(n.to_string()).ok(),
            _ => None,
        });
        Self::from_keys(keys)
    }

    /// Encode as a JSON array of strings in sorted order.
    #[must_use]
    pub fn encode(&self) -> String {
        let items: Vec<&str> = self.keys.iter().map(CompletionKey::as_str).collect();
        // A Vec<&str> always serializes.
        serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string())
    }

    #[must_use]
    pub fn contains(&self, key: &CompletionKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `true` if the key was not present before.
    pub fn insert(&mut self, key: CompletionKey) -> bool {
        self.keys.insert(key)
    }

    /// Returns `true` if the key was present.
    pub fn remove(&mut self, key: &CompletionKey) -> bool {
        self.keys.remove(key)
    }

    /// Flip membership; returns whether the key is present afterwards.
    pub fn toggle(&mut self, key: CompletionKey) -> bool {
        if self.keys.remove(&key) {
            false
        } else {
            self.keys.insert(key);
            true
        }
    }

    /// A lesson counts as completed if any of its keys is present.
    #[must_use]
    pub fn is_lesson_completed(&self, lesson: &Lesson) -> bool {
        lesson
            .completion_keys()
            .iter()
            .any(|key| self.keys.contains(key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompletionKey> {
        self.keys.iter()
    }
}

//
// ─── UNLOCK CHAIN ──────────────────────────────────────────────────────────────
//

/// Whether `lesson` may be opened given the lessons loaded for its category.
///
/// Order 1 is always unlocked. Order `n > 1` requires the lesson at `n - 1`
/// to be completed, unless no such lesson is loaded (fail-open). Lessons from
/// other categories in `lessons` are ignored.
#[must_use]
pub fn is_unlocked(progress: &ProgressSet, lesson: &Lesson, lessons: &[Lesson]) -> bool {
    let order = lesson.order();
    if order <= 1 {
        return true;
    }
    let predecessor = lessons
        .iter()
        .find(|other| other.category() == lesson.category() && other.order() == order - 1);
    match predecessor {
        Some(prev) => progress.is_lesson_completed(prev),
        None => true,
    }
}

/// One row of a category roadmap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoadmapEntry {
    pub order: u32,
    pub title: String,
    pub key: CompletionKey,
    pub unlocked: bool,
    pub completed: bool,
}

/// Unlock and completion state for every lesson, in the given order.
#[must_use]
pub fn roadmap(progress: &ProgressSet, lessons: &[Lesson]) -> Vec<RoadmapEntry> {
    lessons
        .iter()
        .map(|lesson| RoadmapEntry {
            order: lesson.order(),
            title: lesson.title().to_string(),
            key: lesson.completion_key(),
            unlocked: is_unlocked(progress, lesson, lessons),
            completed: progress.is_lesson_completed(lesson),
        })
        .collect()
}
