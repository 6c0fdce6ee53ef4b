use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{query::Pagination, validation::clean_tags};

// --- Enumerations (Mapped to Postgres enum types) ---

/// PostStatus
///
/// Lifecycle state of a post. Only `Published` posts can ever be externally visible.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PostStatus {
    Draft,
    #[default]
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "archived" => Ok(PostStatus::Archived),
            other => Err(format!(
                "status must be one of draft, published, archived (got '{other}')"
            )),
        }
    }
}

/// Role
///
/// The RBAC field carried by every principal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

// --- Core Application Schemas (Mapped to Database) ---

/// Profile
///
/// Optional personal details stored alongside the account. Persisted as flat columns on
/// the `users` table and nested as `profile` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

/// User
///
/// Canonical account record (`users` table). Accounts are deactivated, never removed.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    /// Inactive accounts cannot authenticate and are hidden from user lookups.
    pub is_active: bool,
    #[sqlx(flatten)]
    pub profile: Profile,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Post
///
/// A post record from the `posts` table. `author_id` is fixed at creation and `likes`
/// holds each liker at most once.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub tags: Vec<String>,
    pub status: PostStatus,
    pub is_public: bool,
    pub featured: bool,
    pub likes: Vec<Uuid>,
    pub views: i64,
    pub slug: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

const WORDS_PER_MINUTE: usize = 200;

impl Post {
    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    /// Estimated reading time in whole minutes, never below one.
    pub fn reading_time(&self) -> u32 {
        let words = self.content.split_whitespace().count();
        words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
    }
}

/// PostView
///
/// Output representation of a post, enriched with the derived counters.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub like_count: usize,
    pub reading_time: u32,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        let like_count = post.like_count();
        let reading_time = post.reading_time();
        Self {
            post,
            like_count,
            reading_time,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// CreatePostRequest
///
/// Input payload for POST /api/posts. Unspecified lifecycle fields take their defaults
/// (published, public, not featured).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreatePostRequest {
    #[serde(deserialize_with = "crate::validation::trimmed")]
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: String,

    #[serde(deserialize_with = "crate::validation::trimmed")]
    #[validate(length(
        min = 10,
        max = 10000,
        message = "Content must be between 10 and 10000 characters"
    ))]
    pub content: String,

    #[validate(
        length(max = 10, message = "Cannot have more than 10 tags"),
        custom(function = "crate::validation::validate_tags")
    )]
    #[serde(default, deserialize_with = "crate::validation::trimmed_tags")]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub status: Option<PostStatus>,

    #[serde(default)]
    pub is_public: Option<bool>,

    /// Honoured only for admin callers.
    #[serde(default)]
    pub featured: Option<bool>,
}

impl CreatePostRequest {
    /// Same trimming the deserializer applies, for requests built in code.
    pub fn trimmed(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            content: self.content.trim().to_string(),
            tags: self.tags.map(clean_tags),
            ..self
        }
    }
}

/// UpdatePostRequest
///
/// Partial update payload for PUT /api/posts/{id}. Absent fields are left unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::validation::trimmed_opt"
    )]
    #[validate(length(min = 3, max = 200, message = "Title must be between 3 and 200 characters"))]
    pub title: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::validation::trimmed_opt"
    )]
    #[validate(length(
        min = 10,
        max = 10000,
        message = "Content must be between 10 and 10000 characters"
    ))]
    pub content: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::validation::trimmed_tags"
    )]
    #[validate(
        length(max = 10, message = "Cannot have more than 10 tags"),
        custom(function = "crate::validation::validate_tags")
    )]
    pub tags: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
}

impl UpdatePostRequest {
    pub fn trimmed(self) -> Self {
        Self {
            title: self.title.map(|title| title.trim().to_string()),
            content: self.content.map(|content| content.trim().to_string()),
            tags: self.tags.map(clean_tags),
            ..self
        }
    }
}

/// ProfileUpdate
///
/// Replacement profile supplied on user update. The whole profile is replaced.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProfileUpdate {
    #[serde(default)]
    #[validate(length(max = 50, message = "First name cannot exceed 50 characters"))]
    pub first_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 50, message = "Last name cannot exceed 50 characters"))]
    pub last_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 500, message = "Bio cannot exceed 500 characters"))]
    pub bio: Option<String>,
    #[serde(default)]
    #[validate(url(message = "Avatar must be a valid URL"))]
    pub avatar: Option<String>,
}

impl From<ProfileUpdate> for Profile {
    fn from(update: ProfileUpdate) -> Self {
        Profile {
            first_name: update.first_name,
            last_name: update.last_name,
            bio: update.bio,
            avatar: update.avatar,
        }
    }
}

/// UpdateUserRequest
///
/// Partial update payload for PUT /api/users/{id}. `role` and `isActive` are applied
/// only when the caller is an admin.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::validation::trimmed_opt"
    )]
    #[validate(
        length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
        custom(function = "crate::validation::validate_username")
    )]
    pub username: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::validation::trimmed_opt"
    )]
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub profile: Option<ProfileUpdate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// NewUser
///
/// Account seed handed to the repository. Account registration itself lives outside this
/// service; the store still needs a way to materialise user rows.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub profile: Profile,
}

// --- Response Payloads (Output Schemas) ---

/// PostData: `data` payload carrying a single post.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostData {
    pub post: PostView,
}

/// PostListData: `data` payload for paginated post listings.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PostListData {
    pub posts: Vec<PostView>,
    pub pagination: Pagination,
}

/// FeaturedPostsData: `data` payload for the featured listing (no pagination metadata).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FeaturedPostsData {
    pub posts: Vec<PostView>,
}

/// LikeData: the like count after a toggle.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LikeData {
    pub likes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserData {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserListData {
    pub users: Vec<User>,
    pub pagination: Pagination,
}
