//! Layout-tolerant field extraction over parsed documents.
//!
//! Every field is located by a [`FieldRule`](crate::rules::FieldRule): the
//! primary selector is tried first, the fallback second. Optional fields
//! resolve to [`Extracted::Missing`] instead of failing; required fields go
//! through [`require_text`] / [`require_fragments`] and fail with
//! [`IngestError::MissingField`] naming the field when both selectors miss.
//!
//! List-valued rules (cast, genres, filmography rows) yield owned
//! [`Fragment`]s, each independently re-parsable, so callers can keep
//! extracting from them after the source document is dropped.

use scraper::{Html, Selector};
use tracing::debug;

use crate::error::IngestError;
use crate::rules::FieldRule;

/// Tagged result of an optional field lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Found(String),
    Missing,
}

impl Extracted {
    pub fn into_option(self) -> Option<String> {
        match self {
            Extracted::Found(s) => Some(s),
            Extracted::Missing => None,
        }
    }

    /// The found value, or `default` when the field was missing.
    pub fn unwrap_or(self, default: &str) -> String {
        match self {
            Extracted::Found(s) => s,
            Extracted::Missing => default.to_string(),
        }
    }
}

/// An owned sub-document cut out of a larger page.
#[derive(Debug, Clone)]
pub struct Fragment {
    html: String,
}

impl Fragment {
    pub fn new(html: String) -> Self {
        Self { html }
    }

    /// All text inside the fragment, whitespace-collapsed.
    pub fn text(&self) -> String {
        let doc = Html::parse_fragment(&self.html);
        let joined = doc.root_element().text().collect::<Vec<_>>().join(" ");
        collapse_whitespace(&joined)
    }

    /// The first `href` attribute inside the fragment, if any.
    pub fn href(&self) -> Option<String> {
        let doc = Html::parse_fragment(&self.html);
        let anchor = Selector::parse("a[href]").unwrap();
        doc.select(&anchor)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|h| h.to_string())
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compile(selector: &str) -> Result<Selector, IngestError> {
    Selector::parse(selector).map_err(|e| IngestError::Selector(format!("{selector}: {e}")))
}

/// Run a rule's selectors in order and return matching elements' outer HTML.
fn select_all(doc: &Html, rule: &FieldRule) -> Result<Vec<String>, IngestError> {
    let primary = compile(&rule.selector)?;
    let matched: Vec<String> = doc.select(&primary).map(|el| el.html()).collect();
    if !matched.is_empty() {
        return Ok(matched);
    }

    if let Some(ref fallback) = rule.fallback {
        let fallback = compile(fallback)?;
        let matched: Vec<String> = doc.select(&fallback).map(|el| el.html()).collect();
        if !matched.is_empty() {
            debug!(selector = %rule.selector, "Primary selector missed; fallback matched");
            return Ok(matched);
        }
    }
    Ok(Vec::new())
}

/// Extract a single optional text field.
pub fn extract_text(doc: &Html, rule: &FieldRule) -> Result<Extracted, IngestError> {
    let matched = select_all(doc, rule)?;
    match matched.first() {
        Some(html) => {
            let text = Fragment::new(html.clone()).text();
            if text.is_empty() {
                Ok(Extracted::Missing)
            } else {
                Ok(Extracted::Found(text))
            }
        }
        None => Ok(Extracted::Missing),
    }
}

/// Extract a single required text field, naming it on failure.
pub fn require_text(
    doc: &Html,
    name: &'static str,
    rule: &FieldRule,
) -> Result<String, IngestError> {
    match extract_text(doc, rule)? {
        Extracted::Found(text) => Ok(text),
        Extracted::Missing => Err(IngestError::MissingField(name)),
    }
}

/// Extract a list-valued field as independently re-parsable fragments.
///
/// The matches are collected eagerly: a lazy iterator would keep borrowing
/// the parsed document, which is not `Send` and must be dropped before the
/// caller's next await point. Lists here are page-sized, so the collection
/// cost is negligible.
pub fn extract_fragments(doc: &Html, rule: &FieldRule) -> Result<Vec<Fragment>, IngestError> {
    Ok(select_all(doc, rule)?
        .into_iter()
        .map(Fragment::new)
        .collect())
}

/// Extract a list-valued field that must have at least one entry.
pub fn require_fragments(
    doc: &Html,
    name: &'static str,
    rule: &FieldRule,
) -> Result<Vec<Fragment>, IngestError> {
    let fragments = extract_fragments(doc, rule)?;
    if fragments.is_empty() {
        return Err(IngestError::MissingField(name));
    }
    Ok(fragments)
}
