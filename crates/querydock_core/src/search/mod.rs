//! Query search request/response shapes and match highlighting.
//!
//! # Responsibility
//! - Normalize search input before it reaches a gateway.
//! - Compute case-insensitive highlight ranges for result display.
//!
//! # Invariants
//! - Blank search text never reaches the gateway.
//! - Highlight ranges are byte ranges on char boundaries, sorted, non-overlapping.

use crate::model::entity::{FolderId, Query};
use regex::RegexBuilder;
use std::ops::Range;

/// Default number of hits returned per search.
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;
/// Hard upper bound for one search call.
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Normalized search input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Trimmed search text; matched against title and SQL body.
    pub text: String,
    pub limit: u32,
}

impl SearchRequest {
    /// Builds a request, returning `None` for blank text.
    pub fn new(text: &str, limit: Option<u32>) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            text: trimmed.to_string(),
            limit: normalize_search_limit(limit),
        })
    }
}

/// One search result with enough context to navigate to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub query: Query,
    pub table_name: String,
    /// Folder of the owning table, used to expand the sidebar on navigation.
    pub folder_id: Option<FolderId>,
    /// Byte ranges of the search text inside `query.title`.
    pub title_matches: Vec<Range<usize>>,
    /// Byte ranges of the search text inside `query.sql_code`.
    pub sql_matches: Vec<Range<usize>>,
}

impl SearchHit {
    /// Builds a hit and highlights `needle` in its title and SQL body.
    pub fn new(
        query: Query,
        table_name: String,
        folder_id: Option<FolderId>,
        needle: &str,
    ) -> Self {
        let title_matches = highlight_ranges(&query.title, needle);
        let sql_matches = highlight_ranges(&query.sql_code, needle);
        Self {
            query,
            table_name,
            folder_id,
            title_matches,
            sql_matches,
        }
    }
}

/// Clamps a caller-provided limit into `1..=MAX_SEARCH_LIMIT`.
pub fn normalize_search_limit(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => DEFAULT_SEARCH_LIMIT,
        Some(value) => value.min(MAX_SEARCH_LIMIT),
    }
}

/// Returns byte ranges in `text` matching `needle` case-insensitively.
pub fn highlight_ranges(text: &str, needle: &str) -> Vec<Range<usize>> {
    let needle = needle.trim();
    if needle.is_empty() {
        return Vec::new();
    }
    let Ok(pattern) = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
    else {
        return Vec::new();
    };
    pattern.find_iter(text).map(|found| found.range()).collect()
}

/// Escapes `%`, `_` and `\` for a SQL `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
