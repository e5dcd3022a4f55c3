//! Label dictionary: versioned table mapping printed label text to keys
//!
//! The table is configuration data. A default ships in `config/labels.json`;
//! hosts can load a replacement per document family with
//! [`LabelDictionary::from_json`].
//!
//! Besides printed labels the table carries value patterns (regular
//! expressions matched against a whole value, for values with no label
//! nearby) and the names of issuing bodies recognised on cover pages
//! without a label.

use crate::error::{Error, Result};
use crate::fields::FieldKey;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const DEFAULT_TABLE: &str = include_str!("../config/labels.json");

/// Cover-page identification fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverField {
    Title,
    ReferenceNumber,
    Organization,
    Date,
}

/// On-disk shape of the label table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelTable {
    pub version: String,
    #[serde(default)]
    pub fields: BTreeMap<FieldKey, Vec<String>>,
    #[serde(default)]
    pub cover: BTreeMap<CoverField, Vec<String>>,
    /// Value patterns per field, tried in vocabulary order
    #[serde(default)]
    pub content: BTreeMap<FieldKey, Vec<String>>,
    /// Issuing bodies by display name, with the phrases that name them
    #[serde(default)]
    pub organizations: BTreeMap<String, Vec<String>>,
}

/// A label phrase already split into normalized words
#[derive(Debug, Clone)]
struct Phrase<K> {
    words: Vec<String>,
    key: K,
}

/// Compiled label lookup used by the field identifier and the cover scanner
#[derive(Debug, Clone)]
pub struct LabelDictionary {
    version: String,
    field_exact: HashMap<String, FieldKey>,
    cover_phrases: Vec<Phrase<CoverField>>,
    content_patterns: Vec<(FieldKey, Regex)>,
    organization_phrases: Vec<Phrase<String>>,
}

impl LabelDictionary {
    /// Dictionary built from the bundled default table
    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_TABLE)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let table: LabelTable = serde_json::from_str(json).map_err(|e| Error::InvalidLabelTable {
            reason: e.to_string(),
        })?;
        Self::from_table(table)
    }

    /// Compile a table; a phrase claimed by two keys is rejected
    pub fn from_table(table: LabelTable) -> Result<Self> {
        let mut field_exact = HashMap::new();
        for (key, labels) in &table.fields {
            for label in labels {
                let normalized = normalize_label(label);
                if normalized.is_empty() {
                    continue;
                }
                if let Some(previous) = field_exact.insert(normalized.clone(), *key) {
                    if previous != *key {
                        return Err(Error::InvalidLabelTable {
                            reason: format!(
                                "label '{}' maps to both {} and {}",
                                label, previous, key
                            ),
                        });
                    }
                }
            }
        }

        let mut cover_phrases: Vec<Phrase<CoverField>> = Vec::new();
        for (key, labels) in &table.cover {
            for label in labels {
                let words = label_words(label);
                if words.is_empty() {
                    continue;
                }
                if let Some(existing) = cover_phrases.iter().find(|p| p.words == words) {
                    if existing.key != *key {
                        return Err(Error::InvalidLabelTable {
                            reason: format!("cover label '{}' is ambiguous", label),
                        });
                    }
                    continue;
                }
                cover_phrases.push(Phrase { words, key: *key });
            }
        }
        // Longest phrase wins: "tender reference" before "tender"
        cover_phrases.sort_by(|a, b| b.words.len().cmp(&a.words.len()));

        let mut content_patterns = Vec::new();
        for (key, patterns) in &table.content {
            for pattern in patterns {
                let regex = Regex::new(pattern).map_err(|e| Error::InvalidLabelTable {
                    reason: format!("content pattern for {}: {}", key, e),
                })?;
                content_patterns.push((*key, regex));
            }
        }

        let mut organization_phrases: Vec<Phrase<String>> = table
            .organizations
            .iter()
            .flat_map(|(name, aliases)| {
                aliases.iter().map(move |alias| Phrase {
                    words: label_words(alias),
                    key: name.clone(),
                })
            })
            .filter(|p| !p.words.is_empty())
            .collect();
        organization_phrases.sort_by(|a, b| b.words.len().cmp(&a.words.len()));

        Ok(Self {
            version: table.version,
            field_exact,
            cover_phrases,
            content_patterns,
            organization_phrases,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Field key printed by a blank-page label token, if any
    pub fn field_for_label(&self, text: &str) -> Option<FieldKey> {
        let normalized = normalize_label(text);
        if normalized.is_empty() {
            return None;
        }
        self.field_exact.get(&normalized).copied()
    }

    /// Field whose value pattern matches all of `value`, if any.
    ///
    /// Patterns are tried in vocabulary order; the first match wins.
    pub fn field_for_content(&self, value: &str) -> Option<FieldKey> {
        let value = normalize_whitespace(value);
        if value.is_empty() {
            return None;
        }
        self.content_patterns
            .iter()
            .find(|(_, regex)| regex.is_match(&value))
            .map(|(key, _)| *key)
    }

    /// Display name of the first issuing body named anywhere in `text`
    pub fn organization_in(&self, text: &str) -> Option<&str> {
        let words = label_words(text);
        self.organization_phrases
            .iter()
            .find(|p| words.windows(p.words.len()).any(|w| w == &p.words[..]))
            .map(|p| p.key.as_str())
    }

    /// Match a cover label at the start of `text`.
    ///
    /// Returns the field and whatever raw text follows the label inside the
    /// same token (possibly empty, when the value sits in the next token).
    pub fn match_cover(&self, text: &str) -> Option<(CoverField, String)> {
        let raw_words: Vec<&str> = text.split_whitespace().collect();
        let normalized: Vec<String> = raw_words.iter().map(|w| normalize_word(w)).collect();

        for phrase in &self.cover_phrases {
            let n = phrase.words.len();
            if normalized.len() < n || normalized[..n] != phrase.words[..] {
                continue;
            }
            let remainder = raw_words[n..].join(" ");
            let remainder = remainder
                .trim_start_matches(|c: char| c == ':' || c == '-' || c == '–' || c.is_whitespace())
                .trim_end()
                .to_string();
            return Some((phrase.key, strip_leaders(&remainder)));
        }
        None
    }
}

/// Collapse runs of whitespace to single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether the text is only leader glyphs (underscores, dots, ellipses)
pub fn is_leader_only(text: &str) -> bool {
    let mut saw_leader = false;
    for c in text.chars() {
        if is_leader_char(c) {
            saw_leader = true;
        } else if !c.is_whitespace() {
            return false;
        }
    }
    saw_leader
}

fn is_leader_char(c: char) -> bool {
    matches!(c, '_' | '.' | '…' | '‥' | '·')
}

/// Drop leader runs (three or more leader glyphs, or any underscore/ellipsis)
fn strip_leaders(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if matches!(c, '_' | '…' | '‥') {
            out.push(' ');
            i += 1;
            continue;
        }
        if c == '.' || c == '·' {
            let start = i;
            while i < chars.len() && (chars[i] == '.' || chars[i] == '·') {
                i += 1;
            }
            if i - start >= 3 {
                out.push(' ');
            } else {
                out.extend(&chars[start..i]);
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    normalize_whitespace(&out)
}

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| {
        matches!(c, ':' | '.' | ';' | ',' | '*' | '#' | '(' | ')' | '-' | '–' | '"' | '\'')
    })
    .to_lowercase()
}

fn label_words(text: &str) -> Vec<String> {
    strip_leaders(text)
        .split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect()
}

fn is_enumerator(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit())
        || word.len() == 1 && word.chars().all(|c| c.is_ascii_lowercase())
}

/// Normalized label text: leaders and decoration removed, lower-cased,
/// leading enumerators ("1.", "(a)") dropped
pub fn normalize_label(text: &str) -> String {
    let mut words = label_words(text);
    // Keep a lone word even if it looks like an enumerator
    while words.len() > 1 && is_enumerator(&words[0]) {
        words.remove(0);
    }
    words.join(" ")
}
