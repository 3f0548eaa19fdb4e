//! Reply classification - keyword matching with a free-text fallback

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Sentinel returned when no candidate category fits
pub const OTHER_CATEGORY: &str = "other";

/// Free-text classification capability (e.g. an LLM-backed service).
///
/// Implementations must return a value from the candidate set or the
/// `"other"` sentinel; unclassifiable input is never an error.
#[async_trait]
pub trait FreeTextClassifier: Send + Sync {
    async fn classify(&self, text: &str, candidates: &[String]) -> String;
}

/// Two-stage reply classifier.
///
/// A deterministic keyword pass over the configured category keys runs
/// first; only a miss consults the free-text fallback. The result is
/// always a candidate or [`OTHER_CATEGORY`].
pub struct ResponseClassifier {
    fallback: Option<Arc<dyn FreeTextClassifier>>,
}

impl ResponseClassifier {
    /// Keyword-only classifier
    pub fn new() -> Self {
        Self { fallback: None }
    }

    /// Attach a free-text fallback consulted on keyword miss
    pub fn with_fallback(mut self, fallback: Arc<dyn FreeTextClassifier>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Classify a reply against the candidate categories
    pub async fn classify(&self, text: &str, candidates: &[String]) -> String {
        if let Some(category) = keyword_match(text, candidates) {
            return category;
        }

        if let Some(fallback) = &self.fallback {
            let category = fallback.classify(text, candidates).await;
            if candidates.iter().any(|c| c == &category) {
                return category;
            }
            if category != OTHER_CATEGORY {
                debug!(%category, "Fallback classifier returned a non-candidate, using other");
            }
        }

        OTHER_CATEGORY.to_string()
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Match a reply against category keys by keyword.
///
/// Category keys are treated as phrases (`not_interested` matches the
/// words "not interested" in order); longer phrases are tried first so
/// a specific multi-word category beats a one-word substring of it.
pub fn keyword_match(text: &str, candidates: &[String]) -> Option<String> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return None;
    }
    let haystack = format!(" {} ", normalized);

    let mut ordered: Vec<&String> = candidates.iter().collect();
    ordered.sort_by_key(|c| std::cmp::Reverse(c.split('_').count()));

    for candidate in ordered {
        let phrase = normalize(&candidate.replace('_', " "));
        if phrase.is_empty() {
            continue;
        }
        if haystack.contains(&format!(" {} ", phrase)) {
            return Some(candidate.clone());
        }
    }

    None
}

/// Lowercase and collapse everything that is not alphanumeric to single
/// spaces
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}
