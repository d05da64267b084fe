mod catalog;
mod ids;
mod lesson;
mod progress;

pub use ids::{CategorySlug, LessonId, ParseIdError};

pub use catalog::{Category, builtin_categories, builtin_lessons};
pub use lesson::{CompletionKey, Lesson, LessonDraft, LessonError};
pub use progress::{ProgressSet, RoadmapEntry, is_unlocked, roadmap};
