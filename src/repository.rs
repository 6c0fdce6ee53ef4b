use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    models::{NewUser, Post, Profile, Role, UpdateUserRequest, User},
    query::{PageWindow, PostFilter, SearchMode, SortOrder, search_terms},
    visibility::{NewPost, PostChanges},
};

/// RepositoryError
///
/// Failures of the persistence port. Unique-key violations are surfaced separately so the
/// boundary can report them as conflicts.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{0}")]
    Conflict(String),
    #[error("repository is closed")]
    Closed,
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Emails are stored and compared lowercased, so `Foo@x.io` and `foo@x.io` are one account.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// UserChanges
///
/// Effective partial update of an account. `role` and `is_active` survive only for admin
/// editors; a present `profile` replaces the stored one wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub profile: Option<Profile>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UserChanges {
    pub fn from_request(req: UpdateUserRequest, editor: &AuthUser) -> Self {
        let admin = editor.is_admin();
        Self {
            username: req.username.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
            email: req
                .email
                .map(|e| normalize_email(&e))
                .filter(|e| !e.is_empty()),
            profile: req.profile.map(Profile::from),
            role: req.role.filter(|_| admin),
            is_active: req.is_active.filter(|_| admin),
        }
    }

    pub fn apply_to(&self, user: &mut User, now: chrono::DateTime<chrono::Utc>) {
        if let Some(username) = &self.username {
            user.username = username.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(profile) = &self.profile {
            user.profile = profile.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        user.updated_at = now;
    }
}

/// Repository Trait
///
/// The persistence port. Handlers and extractors only ever see `Arc<dyn Repository>`.
///
/// Listing methods receive a composed [`PostFilter`] and must apply it (baseline
/// visibility included) identically in `find_posts` and `count_posts`. Like toggling and
/// view counting must be single atomic steps inside the store.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Post Retrieval ---
    async fn find_posts(
        &self,
        filter: &PostFilter,
        sort: SortOrder,
        window: PageWindow,
    ) -> RepoResult<Vec<Post>>;
    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<u64>;
    /// Raw lookup by id, no visibility applied.
    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>>;

    // --- Post Mutations ---
    async fn create_post(&self, post: NewPost) -> RepoResult<Post>;
    async fn update_post(&self, id: Uuid, changes: PostChanges) -> RepoResult<Option<Post>>;
    async fn delete_post(&self, id: Uuid) -> RepoResult<bool>;
    /// Adds one view and returns the updated post.
    async fn increment_views(&self, id: Uuid) -> RepoResult<Option<Post>>;
    /// Adds `user_id` to the likers if absent, removes it if present, and returns the new
    /// like count. Applies only to externally visible posts; `None` otherwise.
    async fn toggle_like(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<usize>>;

    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    /// Active users only, newest first. `search` matches username, email and names.
    async fn list_users(&self, search: Option<&str>, window: PageWindow) -> RepoResult<Vec<User>>;
    async fn count_users(&self, search: Option<&str>) -> RepoResult<u64>;
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>>;
    /// Soft delete: clears `is_active`.
    async fn deactivate_user(&self, id: Uuid) -> RepoResult<bool>;

    // --- Lifecycle ---
    async fn close(&self);
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

macro_rules! post_columns {
    () => {
        "id, title, content, author_id, tags, status, is_public, featured, likes, views, slug, created_at, updated_at"
    };
}

macro_rules! user_columns {
    () => {
        "id, username, email, role, is_active, first_name, last_name, bio, avatar, created_at, updated_at"
    };
}

const VISIBLE_BASELINE: &str = " WHERE status = 'published' AND is_public = true";
const FULL_TEXT_DOCUMENT: &str = "to_tsvector('english', title || ' ' || content)";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
    search_mode: SearchMode,
}

impl PostgresRepository {
    pub fn new(pool: PgPool, search_mode: SearchMode) -> Self {
        Self { pool, search_mode }
    }

    /// Opens a pool against `db_url` and applies pending migrations.
    pub async fn connect(
        db_url: &str,
        max_connections: u32,
        search_mode: SearchMode,
    ) -> RepoResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RepositoryError::Sqlx(e.into()))?;
        Ok(Self::new(pool, search_mode))
    }

    /// Appends the baseline predicate and every structured constraint of `filter`.
    fn push_post_filter(&self, builder: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
        builder.push(VISIBLE_BASELINE);

        if let Some(status) = filter.status() {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(author) = filter.author() {
            builder.push(" AND author_id = ").push_bind(author);
        }
        if let Some(tag) = filter.tag() {
            builder.push(" AND ").push_bind(tag.to_string()).push(" = ANY(tags)");
        }
        if let Some(featured) = filter.featured() {
            builder.push(" AND featured = ").push_bind(featured);
        }
        if let Some(text) = filter.text() {
            match self.search_mode {
                SearchMode::FullText => {
                    builder
                        .push(" AND ")
                        .push(FULL_TEXT_DOCUMENT)
                        .push(" @@ to_tsquery('english', ")
                        .push_bind(any_term_tsquery(text))
                        .push(")");
                }
                SearchMode::Pattern => {
                    let pattern = like_pattern(text);
                    builder
                        .push(" AND (title ILIKE ")
                        .push_bind(pattern.clone())
                        .push(" OR content ILIKE ")
                        .push_bind(pattern)
                        .push(")");
                }
            }
        }
    }

    fn push_post_order(
        &self,
        builder: &mut QueryBuilder<'_, Postgres>,
        filter: &PostFilter,
        sort: SortOrder,
    ) {
        builder.push(" ORDER BY ");
        if let (SortOrder::Relevance, Some(text)) = (sort, filter.text()) {
            match self.search_mode {
                SearchMode::FullText => {
                    builder
                        .push("ts_rank(")
                        .push(FULL_TEXT_DOCUMENT)
                        .push(", to_tsquery('english', ")
                        .push_bind(any_term_tsquery(text))
                        .push(")) DESC, ");
                }
                SearchMode::Pattern => {
                    let pattern = like_pattern(text);
                    builder
                        .push("((CASE WHEN title ILIKE ")
                        .push_bind(pattern.clone())
                        .push(" THEN 2 ELSE 0 END) + (CASE WHEN content ILIKE ")
                        .push_bind(pattern)
                        .push(" THEN 1 ELSE 0 END)) DESC, ");
                }
            }
        }
        builder.push("created_at DESC, id DESC");
    }
}

/// `a | b | c` over the search terms, so a post matches when any term does. Terms are
/// alphanumeric runs and carry no tsquery operators.
fn any_term_tsquery(text: &str) -> String {
    search_terms(text).join(" | ")
}

/// `%text%` with LIKE metacharacters escaped.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn map_write_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let message = match db_err.constraint() {
                Some(c) if c.contains("email") => "Email already registered",
                Some(c) if c.contains("username") => "Username already taken",
                _ => "Duplicate value",
            };
            return RepositoryError::Conflict(message.to_string());
        }
    }
    RepositoryError::Sqlx(err)
}

fn push_user_search(builder: &mut QueryBuilder<'_, Postgres>, search: Option<&str>) {
    builder.push(" WHERE is_active = true");
    if let Some(text) = search {
        let pattern = like_pattern(text);
        builder.push(" AND (");
        let mut separated = builder.separated(" OR ");
        for column in ["username", "email", "first_name", "last_name"] {
            separated
                .push(format!("{column} ILIKE "))
                .push_bind_unseparated(pattern.clone());
        }
        builder.push(")");
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_posts(
        &self,
        filter: &PostFilter,
        sort: SortOrder,
        window: PageWindow,
    ) -> RepoResult<Vec<Post>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(concat!("SELECT ", post_columns!(), " FROM posts"));
        self.push_post_filter(&mut builder, filter);
        self.push_post_order(&mut builder, filter, sort);
        builder
            .push(" LIMIT ")
            .push_bind(i64::from(window.limit()))
            .push(" OFFSET ")
            .push_bind(window.skip() as i64);

        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<u64> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM posts");
        self.push_post_filter(&mut builder, filter);
        let total: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(concat!(
            "SELECT ",
            post_columns!(),
            " FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn create_post(&self, post: NewPost) -> RepoResult<Post> {
        let created = sqlx::query_as::<_, Post>(concat!(
            "INSERT INTO posts (id, title, content, author_id, tags, status, is_public, featured, slug) ",
            "VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING ",
            post_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(post.title)
        .bind(post.content)
        .bind(post.author_id)
        .bind(post.tags)
        .bind(post.status)
        .bind(post.is_public)
        .bind(post.featured)
        .bind(post.slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Partial update in one statement; `COALESCE` keeps columns whose change is `None`.
    async fn update_post(&self, id: Uuid, changes: PostChanges) -> RepoResult<Option<Post>> {
        let updated = sqlx::query_as::<_, Post>(concat!(
            "UPDATE posts SET ",
            "title = COALESCE($2, title), ",
            "slug = COALESCE($3, slug), ",
            "content = COALESCE($4, content), ",
            "tags = COALESCE($5, tags), ",
            "status = COALESCE($6, status), ",
            "is_public = COALESCE($7, is_public), ",
            "featured = COALESCE($8, featured), ",
            "updated_at = NOW() ",
            "WHERE id = $1 RETURNING ",
            post_columns!()
        ))
        .bind(id)
        .bind(changes.title)
        .bind(changes.slug)
        .bind(changes.content)
        .bind(changes.tags)
        .bind(changes.status)
        .bind(changes.is_public)
        .bind(changes.featured)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_views(&self, id: Uuid) -> RepoResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(concat!(
            "UPDATE posts SET views = views + 1 WHERE id = $1 RETURNING ",
            post_columns!()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    /// The membership test and the array rewrite happen in the same row update, so
    /// concurrent toggles serialize on the row lock and none is lost.
    async fn toggle_like(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<usize>> {
        let count: Option<i32> = sqlx::query_scalar(
            "UPDATE posts SET \
                likes = CASE WHEN $2 = ANY(likes) THEN array_remove(likes, $2) \
                             ELSE array_append(likes, $2) END, \
                updated_at = NOW() \
             WHERE id = $1 AND status = 'published' AND is_public = true \
             RETURNING cardinality(likes)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.map(|c| c.max(0) as usize))
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(concat!(
            "INSERT INTO users (id, username, email, role, first_name, last_name, bio, avatar) ",
            "VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING ",
            user_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(user.username)
        .bind(normalize_email(&user.email))
        .bind(user.role)
        .bind(user.profile.first_name)
        .bind(user.profile.last_name)
        .bind(user.profile.bio)
        .bind(user.profile.avatar)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn list_users(&self, search: Option<&str>, window: PageWindow) -> RepoResult<Vec<User>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(concat!("SELECT ", user_columns!(), " FROM users"));
        push_user_search(&mut builder, search);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(window.limit()))
            .push(" OFFSET ")
            .push_bind(window.skip() as i64);

        let users = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn count_users(&self, search: Option<&str>) -> RepoResult<u64> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_user_search(&mut builder, search);
        let total: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>> {
        let replace_profile = changes.profile.is_some();
        let profile = changes.profile.unwrap_or_default();
        sqlx::query_as::<_, User>(concat!(
            "UPDATE users SET ",
            "username = COALESCE($2, username), ",
            "email = COALESCE($3, email), ",
            "role = COALESCE($4, role), ",
            "is_active = COALESCE($5, is_active), ",
            "first_name = CASE WHEN $6 THEN $7::text ELSE first_name END, ",
            "last_name = CASE WHEN $6 THEN $8::text ELSE last_name END, ",
            "bio = CASE WHEN $6 THEN $9::text ELSE bio END, ",
            "avatar = CASE WHEN $6 THEN $10::text ELSE avatar END, ",
            "updated_at = NOW() ",
            "WHERE id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.role)
        .bind(changes.is_active)
        .bind(replace_profile)
        .bind(profile.first_name)
        .bind(profile.last_name)
        .bind(profile.bio)
        .bind(profile.avatar)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn deactivate_user(&self, id: Uuid) -> RepoResult<bool> {
        let result =
            sqlx::query("UPDATE users SET is_active = false, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
