//! Fixed mapping of language names to compute-service ids.
//!
//! The compute service identifies runtimes by integer id. Requests with an
//! id outside this table fail fast with `InvalidRequest`, before any
//! network call.

/// Supported runtimes and their compute-service ids.
pub const LANGUAGES: &[(&str, u32)] = &[
    ("c", 50),
    ("csharp", 51),
    ("cpp", 54),
    ("go", 60),
    ("java", 62),
    ("javascript", 63),
    ("php", 68),
    ("python", 71),
    ("ruby", 72),
    ("rust", 73),
    ("typescript", 74),
    ("kotlin", 78),
    ("swift", 83),
];

/// Look up the compute-service id for a language name.
pub fn language_id(name: &str) -> Option<u32> {
    LANGUAGES
        .iter()
        .find(|(lang, _)| *lang == name)
        .map(|(_, id)| *id)
}

/// Whether an id belongs to the recognized enumeration.
pub fn is_recognized(id: u32) -> bool {
    LANGUAGES.iter().any(|(_, lang_id)| *lang_id == id)
}
