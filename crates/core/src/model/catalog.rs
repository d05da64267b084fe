use serde::{Deserialize, Serialize};

use crate::model::{CategorySlug, Lesson, LessonDraft};

/// A lesson category as shown on the roadmap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub slug: CategorySlug,
    pub title: String,
    pub order: u32,
}

const ALPHABET: [&str; 33] = [
    "А", "Б", "В", "Г", "Д", "Е", "Ё", "Ж", "З", "И", "Й", "К", "Л", "М", "Н", "О", "П", "Р", "С",
    "Т", "У", "Ф", "Х", "Ц", "Ч", "Ш", "Щ", "Ъ", "Ы", "Ь", "Э", "Ю", "Я",
];

/// (media file stem, title)
const ANIMALS: [(&str, &str); 10] = [
    ("cat", "Кошка"),
    ("dog", "Собака"),
    ("goat", "Коза"),
    ("moose", "Лось"),
    ("snake", "Змея"),
    ("dolphin", "Дельфин"),
    ("donkey", "Осёл"),
    ("eagle", "Орел"),
    ("fox", "Лиса"),
    ("elephant", "Слон"),
];

const CATEGORIES: [(&str, &str); 3] = [("words", "Алфавит"), ("animals", "Животные"), ("numbers", "Числа")];

/// Categories available without a backend, in roadmap order.
#[must_use]
pub fn builtin_categories() -> Vec<Category> {
    CATEGORIES
        .iter()
        .zip(1_u32..)
        .filter_map(|((slug, title), order)| {
            Some(Category {
                slug: CategorySlug::new(slug).ok()?,
                title: (*title).to_string(),
                order,
            })
        })
        .collect()
}

/// Offline lesson list for a category; empty for unknown slugs.
///
/// Built-in lessons have no backend id, so their completion key is `slug:order`.
#[must_use]
pub fn builtin_lessons(slug: &CategorySlug) -> Vec<Lesson> {
    let entries: Vec<(String, String)> = match slug.as_str() {
        "words" => ALPHABET
            .iter()
            .map(|letter| ((*letter).to_string(), (*letter).to_string()))
            .collect(),
        "numbers" => (0..10).map(|n| (n.to_string(), n.to_string())).collect(),
        "animals" => ANIMALS
            .iter()
            .map(|(file, title)| ((*file).to_string(), (*title).to_string()))
            .collect(),
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .zip(1_u32..)
        .filter_map(|((file, title), order)| {
            LessonDraft::new(slug.clone(), order, title)
                .with_media_url(format!("/videos/{slug}/{file}.mp4"))
                .validate()
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_categories_are_ordered() {
        let slugs: Vec<String> = builtin_categories()
            .into_iter()
            .map(|c| c.slug.to_string())
            .collect();
        assert_eq!(slugs, vec!["words", "animals", "numbers"]);
    }

    #[test]
    fn builtin_lessons_are_contiguous_from_one() {
        for category in builtin_categories() {
            let lessons = builtin_lessons(&category.slug);
            assert!(!lessons.is_empty());
            for (idx, lesson) in lessons.iter().enumerate() {
                assert_eq!(lesson.order() as usize, idx + 1);
                assert!(lesson.id().is_none());
            }
        }
    }

    #[test]
    fn builtin_media_urls_follow_layout() {
        let animals = builtin_lessons(&CategorySlug::new("animals").unwrap());
        assert_eq!(animals[0].media_url(), Some("/videos/animals/cat.mp4"));
        assert_eq!(animals[0].target_word(), "Кошка");

        let words = builtin_lessons(&CategorySlug::new("words").unwrap());
        assert_eq!(words.len(), 33);
        assert_eq!(words[0].completion_key().as_str(), "words:1");
    }

    #[test]
    fn unknown_category_has_no_lessons() {
        assert!(builtin_lessons(&CategorySlug::new("colors").unwrap()).is_empty());
    }
}
