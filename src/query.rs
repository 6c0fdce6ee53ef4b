//! Query composition and pagination for post listings.
//!
//! A [`PostFilter`] is built once from request parameters and never mutated afterwards.
//! Every filter is conjoined with the externally-visible baseline (`published` and
//! public): listings never surface drafts, archived or private posts, not even to their
//! owner. Direct retrieval by id is the only path with owner/admin visibility.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::{ApiError, FieldError},
    models::{Post, PostStatus},
};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_FEATURED_LIMIT: u32 = 5;
pub const MAX_LIMIT: u32 = 100;

// --- Raw Query Parameters ---

/// ListPostsParams
///
/// Accepted query parameters for GET /api/posts. Kept as raw strings so malformed
/// numbers fall back to defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPostsParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    /// One of `draft`, `published`, `archived`.
    pub status: Option<String>,
    /// Author UUID (exact match).
    pub author: Option<String>,
    /// Tag membership.
    pub tag: Option<String>,
    /// `true` or `false`; anything else is ignored.
    pub featured: Option<String>,
}

/// SearchParams
///
/// Query parameters shared by the free-text search endpoints (posts and users).
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Free-text query (required).
    pub q: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// PageParams: bare pagination parameters.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// FeaturedParams: the featured listing only takes a size.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeaturedParams {
    pub limit: Option<String>,
}

// --- Page Window ---

/// PageWindow
///
/// A validated `(page, limit)` pair; both are always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    page: u32,
    limit: u32,
}

impl PageWindow {
    /// Builds a window from already-numeric values, clamping into the valid range.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Parses raw query values. Absent, non-numeric or non-positive values fall back to
    /// the given defaults.
    pub fn parse(page: Option<&str>, limit: Option<&str>, default_limit: u32) -> Self {
        let page = parse_positive(page).unwrap_or(DEFAULT_PAGE);
        let limit = parse_positive(limit).unwrap_or(default_limit);
        Self::new(page, limit)
    }

    pub fn first(limit: u32) -> Self {
        Self::new(1, limit)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Slices an already-sorted sequence to this window.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip() as usize)
            .take(self.limit as usize)
            .collect()
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_LIMIT)
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value >= 1)
}

/// Pagination
///
/// Metadata returned alongside every paginated listing. `total` is counted with the same
/// filter as the page itself, so `pages == ceil(total / limit)` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(window: PageWindow, total: u64) -> Self {
        Self {
            page: window.page(),
            limit: window.limit(),
            total,
            pages: total.div_ceil(u64::from(window.limit())),
        }
    }
}

// --- Sorting & Relevance ---

/// SortOrder
///
/// Every order ends with a descending id tie-break so repeated queries page identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Creation time, newest first.
    #[default]
    Newest,
    /// Relevance score of the filter's text query, best first, then newest first.
    Relevance,
}

/// SearchMode
///
/// The two interchangeable relevance strategies. Which one a store uses is configuration,
/// not request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Term based matching: any query term matches, weighted by frequency (title counts double).
    #[default]
    FullText,
    /// Case-insensitive substring match of the whole query (title hit 2, content hit 1).
    Pattern,
}

impl SearchMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fulltext" | "full_text" | "text" => Some(SearchMode::FullText),
            "pattern" | "regex" => Some(SearchMode::Pattern),
            _ => None,
        }
    }

    /// score
    ///
    /// Relevance of a post for `query`; `None` means the post does not match at all.
    ///
    /// *FullText*: the sum over query terms of `2 × title hits + content hits`, so any
    /// single matching term is enough. The Postgres store mirrors this with an OR
    /// `tsquery` and `ts_rank`.
    ///
    /// *Pattern*: 2 for a title hit plus 1 for a content hit of the whole query.
    pub fn score(&self, query: &str, title: &str, content: &str) -> Option<f64> {
        let score = match self {
            SearchMode::FullText => {
                let terms = search_terms(query);
                if terms.is_empty() {
                    return None;
                }
                let title_tokens = search_terms(title);
                let content_tokens = search_terms(content);
                terms
                    .iter()
                    .map(|term| {
                        let in_title = title_tokens.iter().filter(|t| *t == term).count();
                        let in_content = content_tokens.iter().filter(|t| *t == term).count();
                        (2 * in_title + in_content) as f64
                    })
                    .sum::<f64>()
            }
            SearchMode::Pattern => {
                let needle = query.trim().to_lowercase();
                if needle.is_empty() {
                    return None;
                }
                let mut score = 0.0;
                if title.to_lowercase().contains(&needle) {
                    score += 2.0;
                }
                if content.to_lowercase().contains(&needle) {
                    score += 1.0;
                }
                score
            }
        };
        (score > 0.0).then_some(score)
    }
}

/// Lowercased alphanumeric runs of `text`. Both stores split full-text queries this way.
pub fn search_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// --- Filter ---

/// PostFilter
///
/// Immutable set of listing constraints. Built with the consuming `with_*` methods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFilter {
    status: Option<PostStatus>,
    author: Option<Uuid>,
    tag: Option<String>,
    featured: Option<bool>,
    text: Option<String>,
}

impl PostFilter {
    /// The bare externally-visible baseline.
    pub fn visible() -> Self {
        Self::default()
    }

    /// from_list_params
    ///
    /// Composes a filter from the public listing parameters.
    ///
    /// *Validation*: an unknown `status` and a malformed `author` are both reported in
    /// one `ApiError::Validation`, so the client sees every bad field at once. Empty
    /// values count as absent, and `featured` other than `true`/`false` is ignored.
    pub fn from_list_params(params: &ListPostsParams) -> Result<Self, ApiError> {
        let mut filter = Self::visible();
        let mut errors = Vec::new();

        if let Some(raw) = non_empty(params.status.as_deref()) {
            match raw.parse::<PostStatus>() {
                Ok(status) => filter = filter.with_status(status),
                Err(message) => errors.push(FieldError::new("status", message)),
            }
        }
        if let Some(raw) = non_empty(params.author.as_deref()) {
            match Uuid::parse_str(raw) {
                Ok(author) => filter = filter.with_author(author),
                Err(_) => errors.push(FieldError::new("author", "author must be a valid id")),
            }
        }
        if let Some(tag) = non_empty(params.tag.as_deref()) {
            filter = filter.with_tag(tag);
        }
        match non_empty(params.featured.as_deref()) {
            Some("true") => filter = filter.with_featured(true),
            Some("false") => filter = filter.with_featured(false),
            _ => {}
        }

        if errors.is_empty() {
            Ok(filter)
        } else {
            Err(ApiError::Validation(errors))
        }
    }

    pub fn with_status(self, status: PostStatus) -> Self {
        Self {
            status: Some(status),
            ..self
        }
    }

    pub fn with_author(self, author: Uuid) -> Self {
        Self {
            author: Some(author),
            ..self
        }
    }

    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..self
        }
    }

    pub fn with_featured(self, featured: bool) -> Self {
        Self {
            featured: Some(featured),
            ..self
        }
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..self
        }
    }

    pub fn status(&self) -> Option<PostStatus> {
        self.status
    }

    pub fn author(&self) -> Option<Uuid> {
        self.author
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn featured(&self) -> Option<bool> {
        self.featured
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Evaluates the structured part of the filter (baseline + field constraints). The
    /// text constraint is scored separately by [`SearchMode::score`].
    pub fn matches(&self, post: &Post) -> bool {
        crate::visibility::is_externally_visible(post)
            && self.status.is_none_or(|status| post.status == status)
            && self.author.is_none_or(|author| post.author_id == author)
            && self
                .tag
                .as_deref()
                .is_none_or(|tag| post.tags.iter().any(|t| t == tag))
            && self.featured.is_none_or(|featured| post.featured == featured)
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

/// compare_posts
///
/// Orders two scored posts for `sort`. Scores are ignored for [`SortOrder::Newest`].
/// The final id comparison makes the order total, so page boundaries never shift
/// between identical requests.
pub fn compare_posts(sort: SortOrder, a: (&Post, f64), b: (&Post, f64)) -> Ordering {
    let newest = b.0.created_at.cmp(&a.0.created_at);
    let primary = match sort {
        SortOrder::Newest => newest,
        SortOrder::Relevance => b.1.total_cmp(&a.1).then(newest),
    };
    primary.then_with(|| b.0.id.cmp(&a.0.id))
}
