//! Problem identity derived from page URLs and titles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::ProblemId;

/// Maximum URL prefix used as a fallback identifier when the path carries no
/// recognizable problem slug.
const FALLBACK_PREFIX_LEN: usize = 20;

/// Titles the page reports before the real one has loaded.
const PLACEHOLDER_TITLES: &[&str] = &["(loading...)", "(unknown)"];

/// Coding platform a problem page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Leetcode,
    Gfg,
    #[default]
    Unknown,
}

impl Platform {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Leetcode => "leetcode",
            Self::Gfg => "gfg",
            Self::Unknown => "unknown",
        }
    }

    /// Detects the platform from a page URL's host.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        if url.contains("leetcode.com") {
            Self::Leetcode
        } else if url.contains("geeksforgeeks.org") {
            Self::Gfg
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leetcode" => Ok(Self::Leetcode),
            "gfg" => Ok(Self::Gfg),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("invalid platform: {s}")),
        }
    }
}

/// Derives the problem identifier from a page URL.
///
/// Recognizes `/problems/{slug}` paths; anything else falls back to a short
/// URL prefix so the session still gets a stable, comparable identity.
#[must_use]
pub fn extract_problem_id(url: &str) -> ProblemId {
    let slug = problem_slug(url).unwrap_or_else(|| fallback_slug(url));
    ProblemId::new(slug).unwrap_or_else(|_| ProblemId::unknown())
}

/// Extracts the `{slug}` from a `/problems/{slug}` URL path, if present.
fn problem_slug(url: &str) -> Option<String> {
    let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (_, path) = after_scheme.split_once('/')?;
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let mut parts = path.split('/').filter(|part| !part.is_empty());
    if parts.next()? != "problems" {
        return None;
    }
    parts.next().map(str::to_string).filter(|slug| !slug.is_empty())
}

/// Fallback identity for URLs without a problem path.
fn fallback_slug(url: &str) -> String {
    let prefix: String = url.chars().take(FALLBACK_PREFIX_LEN).collect();
    if prefix.is_empty() {
        ProblemId::UNKNOWN.to_string()
    } else {
        prefix
    }
}

/// Slugifies an externally-reported problem title for comparison against a
/// session's problem ID: lowercase, whitespace runs become single hyphens.
#[must_use]
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Whether a reported title is a placeholder the page shows before the real
/// title has resolved. Placeholder titles defer session-start emission.
#[must_use]
pub fn is_placeholder_title(title: &str) -> bool {
    let trimmed = title.trim();
    trimmed.is_empty() || PLACEHOLDER_TITLES.contains(&trimmed)
}
