//! Post lifecycle: who can observe a post, and how caller-authorized writes reshape it.
//!
//! Lifecycle state is `status × is_public`. There are no timed transitions; every change
//! is an explicit, authorized field update.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    access,
    auth::AuthUser,
    error::ApiError,
    models::{CreatePostRequest, Post, PostStatus, UpdatePostRequest},
};

/// is_externally_visible
///
/// The baseline predicate: published and public. Anonymous callers, listings, search and
/// likes only ever see posts for which this holds.
pub fn is_externally_visible(post: &Post) -> bool {
    post.status == PostStatus::Published && post.is_public
}

/// can_view
///
/// Direct retrieval policy.
///
/// | viewer          | draft | archived | private | published + public |
/// |-----------------|-------|----------|---------|--------------------|
/// | anonymous       | no    | no       | no      | yes                |
/// | other user      | no    | no       | no      | yes                |
/// | owner or admin  | yes   | yes      | yes     | yes                |
pub fn can_view(viewer: Option<&AuthUser>, post: &Post) -> bool {
    is_externally_visible(post)
        || viewer.is_some_and(|principal| access::can_mutate(principal, post.author_id))
}

/// ensure_visible
///
/// Turns a raw lookup into the post, or NOT_FOUND when it is absent or hidden from
/// `viewer`. The two causes produce the same error, so callers cannot tell a draft from
/// a missing post.
pub fn ensure_visible(viewer: Option<&AuthUser>, post: Option<Post>) -> Result<Post, ApiError> {
    match post {
        Some(post) if can_view(viewer, &post) => Ok(post),
        _ => Err(ApiError::not_found("Post")),
    }
}

/// slugify
///
/// URL slug derived from a title: lowercase ASCII alphanumerics, words joined by single
/// hyphens, no leading or trailing hyphen.
///
/// Uniqueness is not enforced.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect::<String>()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// NewPost
///
/// A validated creation request bound to its author, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub author_id: Uuid,
    pub tags: Vec<String>,
    pub status: PostStatus,
    pub is_public: bool,
    pub featured: bool,
}

impl NewPost {
    /// The creator becomes the immutable author. `featured` is dropped for non-admins.
    ///
    /// Text is trimmed before the length rules are checked, so a title of blanks is
    /// rejected rather than stored empty.
    pub fn from_request(req: CreatePostRequest, author: &AuthUser) -> Result<Self, ApiError> {
        let req = req.trimmed();
        req.validate()?;
        Ok(Self {
            slug: slugify(&req.title),
            title: req.title,
            content: req.content,
            author_id: author.id,
            tags: req.tags.unwrap_or_default(),
            status: req.status.unwrap_or_default(),
            is_public: req.is_public.unwrap_or(true),
            featured: access::can_set_featured(author) && req.featured.unwrap_or(false),
        })
    }

    /// Materialises the row: no likes, zero views, both timestamps set to `now`.
    pub fn into_post(self, id: Uuid, now: DateTime<Utc>) -> Post {
        Post {
            id,
            title: self.title,
            content: self.content,
            author_id: self.author_id,
            tags: self.tags,
            status: self.status,
            is_public: self.is_public,
            featured: self.featured,
            likes: Vec::new(),
            views: 0,
            slug: self.slug,
            created_at: now,
            updated_at: now,
        }
    }
}

/// PostChanges
///
/// The effective partial update after authorization filtering. `None` leaves the field
/// untouched. `slug` is set exactly when `title` is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
    pub is_public: Option<bool>,
    pub featured: Option<bool>,
}

impl PostChanges {
    /// `featured` is silently ignored unless `editor` is an admin. A present title or
    /// content must still satisfy the length rules once trimmed.
    pub fn from_request(req: UpdatePostRequest, editor: &AuthUser) -> Result<Self, ApiError> {
        let req = req.trimmed();
        req.validate()?;
        Ok(Self {
            slug: req.title.as_deref().map(slugify),
            title: req.title,
            content: req.content,
            tags: req.tags,
            status: req.status,
            is_public: req.is_public,
            featured: req.featured.filter(|_| access::can_set_featured(editor)),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == PostChanges::default()
    }

    /// Writes the present fields onto `post` and bumps `updated_at`. Used by the
    /// in-memory store; Postgres applies the same fields with `COALESCE`.
    pub fn apply_to(&self, post: &mut Post, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            post.title = title.clone();
        }
        if let Some(slug) = &self.slug {
            post.slug = slug.clone();
        }
        if let Some(content) = &self.content {
            post.content = content.clone();
        }
        if let Some(tags) = &self.tags {
            post.tags = tags.clone();
        }
        if let Some(status) = self.status {
            post.status = status;
        }
        if let Some(is_public) = self.is_public {
            post.is_public = is_public;
        }
        if let Some(featured) = self.featured {
            post.featured = featured;
        }
        post.updated_at = now;
    }
}
