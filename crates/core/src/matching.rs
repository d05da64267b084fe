//! Label comparison used to decide whether a recognized gesture matches a lesson.

/// Trim, lowercase and collapse internal whitespace runs to a single space.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case- and whitespace-insensitive equality. Blank inputs never match.
#[must_use]
pub fn labels_match(recognized: &str, target: &str) -> bool {
    let recognized = normalize(recognized);
    if recognized.is_empty() {
        return false;
    }
    recognized == normalize(target)
}
