//! Slug normalization and collision probing.
//!
//! Slugs are lowercase `a-z0-9-` identifiers derived from an exam or subject
//! display name. Uniqueness is scoped (global for exams, per-exam for
//! subjects) and enforced twice: the probe here finds the first free
//! candidate, and a UNIQUE constraint in the schema closes the remaining
//! check-then-write race between concurrent creators.

/// Normalizes a display name into a URL-safe slug.
///
/// Whitespace runs (and existing hyphens) become a single hyphen; every other
/// character outside `a-z0-9` is dropped without leaving a separator behind,
/// so `"AT&T Exam"` becomes `att-exam` while `"Obstetrics & Gynecology"`
/// becomes `obstetrics-gynecology`. The result never starts or ends with a
/// hyphen and never contains two in a row. It is empty when the input has no
/// usable characters; callers must treat that as invalid input.
#[must_use]
pub fn normalize(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_separator = false;
    for ch in input.trim().to_lowercase().chars() {
        if ch.is_whitespace() || ch == '-' {
            pending_separator = true;
        } else if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch);
        }
        // Anything else (punctuation, symbols, underscores) is stripped and
        // does not force a separator of its own.
    }
    slug
}

/// Picks the slug base: the abbreviation when present and non-blank,
/// otherwise the name.
#[must_use]
pub fn base_candidate<'a>(name: &'a str, abbreviation: Option<&'a str>) -> &'a str {
    match abbreviation {
        Some(abbr) if !abbr.trim().is_empty() => abbr,
        _ => name,
    }
}

/// Returns the first free slug in the probe sequence `base`, `base-1`,
/// `base-2`, ...
///
/// `is_taken` is the caller's view of the scope (usually the set of slugs
/// already persisted there). The probe is a stateless computation over that
/// view and always terminates because the scope is finite.
pub fn first_free<F>(base: &str, mut is_taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !is_taken(base) {
        return base.to_string();
    }
    let mut counter = 1u64;
    loop {
        let candidate = format!("{base}-{counter}");
        if !is_taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn normalize_basic_name() {
        assert_eq!(
            normalize("Saudi Medical Licensure Examination"),
            "saudi-medical-licensure-examination"
        );
    }

    #[test]
    fn normalize_lowercases_and_trims() {
        assert_eq!(normalize("  SMLE  "), "smle");
    }

    #[test]
    fn normalize_collapses_whitespace_runs() {
        assert_eq!(normalize("a \t\n b"), "a-b");
    }

    #[test]
    fn normalize_strips_punctuation_without_separator() {
        assert_eq!(normalize("AT&T Exam"), "att-exam");
        assert_eq!(normalize("Obstetrics & Gynecology"), "obstetrics-gynecology");
    }

    #[test]
    fn normalize_strips_underscores() {
        assert_eq!(normalize("foo_bar baz"), "foobar-baz");
    }

    #[test]
    fn normalize_collapses_existing_hyphens() {
        assert_eq!(normalize("pre--existing -- hyphens"), "pre-existing-hyphens");
    }

    #[test]
    fn normalize_no_leading_or_trailing_hyphens() {
        assert_eq!(normalize("---Internal Medicine---"), "internal-medicine");
    }

    #[test]
    fn normalize_can_be_empty() {
        assert_eq!(normalize("!!! ***"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_output_charset_holds_for_arbitrary_input() {
        let inputs = [
            "Ünïcode Näme",
            "emoji 🎓 exam",
            "  --  ",
            "123 Numbers & Letters!",
            "tab\tand\nnewline",
        ];
        for input in inputs {
            let slug = normalize(input);
            assert!(
                slug.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
                "unexpected character in {slug:?}"
            );
            assert!(!slug.starts_with('-'), "leading hyphen in {slug:?}");
            assert!(!slug.ends_with('-'), "trailing hyphen in {slug:?}");
            assert!(!slug.contains("--"), "doubled hyphen in {slug:?}");
        }
    }

    #[test]
    fn base_candidate_prefers_abbreviation() {
        assert_eq!(
            base_candidate("Saudi Medical Licensure Examination", Some("SMLE")),
            "SMLE"
        );
    }

    #[test]
    fn base_candidate_ignores_blank_abbreviation() {
        assert_eq!(base_candidate("Some Exam", Some("   ")), "Some Exam");
        assert_eq!(base_candidate("Some Exam", None), "Some Exam");
    }

    #[test]
    fn first_free_returns_base_when_unused() {
        let taken: HashSet<&str> = HashSet::new();
        assert_eq!(first_free("smle", |s| taken.contains(s)), "smle");
    }

    #[test]
    fn first_free_appends_counter_on_collision() {
        let taken: HashSet<&str> = ["smle"].into_iter().collect();
        assert_eq!(first_free("smle", |s| taken.contains(s)), "smle-1");
    }

    #[test]
    fn first_free_skips_to_next_unused_suffix() {
        let taken: HashSet<&str> = ["smle", "smle-1", "smle-2"].into_iter().collect();
        assert_eq!(first_free("smle", |s| taken.contains(s)), "smle-3");
    }

    #[test]
    fn two_assignments_with_same_name_diverge() {
        let mut taken: HashSet<String> = HashSet::new();
        let first = first_free("smle", |s| taken.contains(s));
        taken.insert(first.clone());
        let second = first_free("smle", |s| taken.contains(s));
        assert_eq!(first, "smle");
        assert_eq!(second, "smle-1");
        assert_ne!(first, second);
    }
}
