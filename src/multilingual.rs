//! Multilingual content normalization against a controlled language vocabulary.
//!
//! Harvested feeds tag free text with whatever language codes the remote
//! repository uses (`en`, `EN `, `sr-Cyrl`, nothing at all). The
//! [`Normalizer`] maps each `(code, text)` pair onto the controlled vocabulary
//! exposed by a [`LanguageTagRegistry`]:
//!
//! - the code is trimmed and uppercased, then looked up by exact match;
//! - entries whose code is not in the vocabulary are dropped silently;
//! - at most one entry per language tag is kept (the first one seen);
//! - every surviving entry gets priority [`FLAT_PRIORITY`].
//!
//! The flat priority is a fidelity limitation carried over from the system
//! this crate feeds: the relative order of the source entries is kept as list
//! order but is not encoded in `priority`.
//!
//! # Examples
//!
//! ```ignore
//! use cerif_harvest::multilingual::{InMemoryLanguageTagRegistry, Normalizer};
//!
//! let registry = InMemoryLanguageTagRegistry::from_codes(["EN", "SR"]);
//! let content = Normalizer::new(&registry).normalize([("en", "Title"), ("xx", "Dropped")]);
//! assert_eq!(content.len(), 1);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::model::LangText;

/// Priority assigned to every normalized entry.
pub const FLAT_PRIORITY: u32 = 1;

/// Identifier of a language tag in the controlled vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LanguageTagId(pub u32);

/// A language tag from the controlled vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTag {
    /// Registry id.
    pub id: LanguageTagId,
    /// Canonical (uppercase) code, e.g. `EN` or `SR-CYR`.
    pub code: String,
}

/// Lookup into the controlled language vocabulary.
pub trait LanguageTagRegistry: Send + Sync {
    /// Finds the tag whose code equals `value` exactly.
    fn find_language_tag_by_value(&self, value: &str) -> Option<LanguageTag>;
}

impl<T: LanguageTagRegistry + ?Sized> LanguageTagRegistry for &T {
    fn find_language_tag_by_value(&self, value: &str) -> Option<LanguageTag> {
        (**self).find_language_tag_by_value(value)
    }
}

impl<T: LanguageTagRegistry + ?Sized> LanguageTagRegistry for std::sync::Arc<T> {
    fn find_language_tag_by_value(&self, value: &str) -> Option<LanguageTag> {
        (**self).find_language_tag_by_value(value)
    }
}

/// Registry backed by a hash map, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLanguageTagRegistry {
    tags: HashMap<String, LanguageTag>,
}

impl InMemoryLanguageTagRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from codes; ids are assigned in iteration order from 1.
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for code in codes {
            let next = u32::try_from(registry.tags.len()).unwrap_or(u32::MAX - 1) + 1;
            registry.insert(LanguageTag {
                id: LanguageTagId(next),
                code: code.into(),
            });
        }
        registry
    }

    /// Adds or replaces a tag.
    pub fn insert(&mut self, tag: LanguageTag) {
        self.tags.insert(tag.code.clone(), tag);
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the registry has no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl LanguageTagRegistry for InMemoryLanguageTagRegistry {
    fn find_language_tag_by_value(&self, value: &str) -> Option<LanguageTag> {
        self.tags.get(value).cloned()
    }
}

/// One normalized multilingual entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultilingualEntry {
    /// Registry id of the language.
    pub language_tag_id: LanguageTagId,
    /// Registry code of the language.
    pub language_tag_code: String,
    /// Normalized text.
    pub text: String,
    /// Display/fallback priority.
    pub priority: u32,
}

/// Ordered set of texts, at most one per language tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultilingualContent {
    entries: Vec<MultilingualEntry>,
}

impl MultilingualContent {
    /// Creates empty content.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry unless its tag is already present. Returns whether it was added.
    pub fn push(&mut self, entry: MultilingualEntry) -> bool {
        if self.contains_tag(entry.language_tag_id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Whether an entry for this tag exists.
    #[must_use]
    pub fn contains_tag(&self, id: LanguageTagId) -> bool {
        self.entries.iter().any(|e| e.language_tag_id == id)
    }

    /// Entries in source order.
    #[must_use]
    pub fn entries(&self) -> &[MultilingualEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text for a language code (uppercase registry code).
    #[must_use]
    pub fn text_for(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.language_tag_code == code)
            .map(|e| e.text.as_str())
    }

    /// First entry with the lowest priority value.
    #[must_use]
    pub fn preferred(&self) -> Option<&str> {
        self.entries
            .iter()
            .min_by_key(|e| e.priority)
            .map(|e| e.text.as_str())
    }

    /// Adds every entry of `other` whose language is missing here.
    ///
    /// Returns the number of entries added.
    pub fn absorb_missing(&mut self, other: &MultilingualContent) -> usize {
        other
            .entries
            .iter()
            .filter(|entry| self.push((*entry).clone()))
            .count()
    }
}

/// Maps raw `(language code, text)` pairs onto the controlled vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a, R: ?Sized> {
    registry: &'a R,
}

impl<'a, R: LanguageTagRegistry + ?Sized> Normalizer<'a, R> {
    /// Creates a normalizer over a registry.
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }

    /// Normalizes raw entries. Unknown codes are dropped; survivors get [`FLAT_PRIORITY`].
    pub fn normalize<I, C, T>(&self, raw: I) -> MultilingualContent
    where
        I: IntoIterator<Item = (C, T)>,
        C: AsRef<str>,
        T: AsRef<str>,
    {
        let mut content = MultilingualContent::new();
        for (code, text) in raw {
            let lookup = code.as_ref().trim().to_uppercase();
            let Some(tag) = self.registry.find_language_tag_by_value(&lookup) else {
                continue;
            };
            content.push(MultilingualEntry {
                language_tag_id: tag.id,
                language_tag_code: tag.code,
                text: text.as_ref().trim().nfc().collect(),
                priority: FLAT_PRIORITY,
            });
        }
        content
    }

    /// Normalizes harvested [`LangText`]s; untagged texts have no code and are dropped.
    pub fn normalize_texts(&self, texts: &[LangText]) -> MultilingualContent {
        self.normalize(
            texts
                .iter()
                .map(|t| (t.lang.as_deref().unwrap_or(""), t.text.as_str())),
        )
    }
}
