use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    models::{NewUser, Post, User},
    query::{PageWindow, PostFilter, SearchMode, SortOrder, compare_posts},
    repository::{RepoResult, Repository, RepositoryError, UserChanges, normalize_email},
    visibility::{self, NewPost, PostChanges},
};

/// InMemoryRepository
///
/// `Repository` held entirely in process memory. Used when no `DATABASE_URL` is configured
/// in `Env::Local`, and by the test suite.
///
/// Every mutation runs under a single write-lock acquisition, which makes like toggles
/// and view increments atomic read-modify-write steps.
pub struct InMemoryRepository {
    posts: RwLock<HashMap<Uuid, Post>>,
    users: RwLock<HashMap<Uuid, User>>,
    search_mode: SearchMode,
    closed: AtomicBool,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new(SearchMode::default())
    }
}

impl InMemoryRepository {
    pub fn new(search_mode: SearchMode) -> Self {
        Self {
            posts: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            search_mode,
            closed: AtomicBool::new(false),
        }
    }

    /// Stores a fully formed post as-is. Lets callers control timestamps and counters.
    pub async fn insert_post(&self, post: Post) {
        self.posts.write().await.insert(post.id, post);
    }

    /// Stores a fully formed user as-is.
    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    fn ensure_open(&self) -> RepoResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RepositoryError::Closed);
        }
        Ok(())
    }

    /// Relevance of `post` for the filter's text; `Some(0.0)` when there is no text query.
    fn score(&self, filter: &PostFilter, post: &Post) -> Option<f64> {
        match filter.text() {
            Some(text) => self.search_mode.score(text, &post.title, &post.content),
            None => Some(0.0),
        }
    }

    fn user_matches(user: &User, search: Option<&str>) -> bool {
        if !user.is_active {
            return false;
        }
        let Some(needle) = search.map(|s| s.trim().to_lowercase()) else {
            return true;
        };
        let fields = [
            Some(user.username.as_str()),
            Some(user.email.as_str()),
            user.profile.first_name.as_deref(),
            user.profile.last_name.as_deref(),
        ];
        fields
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    fn ensure_unique(
        users: &HashMap<Uuid, User>,
        id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> RepoResult<()> {
        for user in users.values().filter(|u| Some(u.id) != id) {
            if username.is_some_and(|name| user.username == name) {
                return Err(RepositoryError::Conflict("Username already taken".to_string()));
            }
            if email.is_some_and(|mail| user.email == mail) {
                return Err(RepositoryError::Conflict("Email already registered".to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_posts(
        &self,
        filter: &PostFilter,
        sort: SortOrder,
        window: PageWindow,
    ) -> RepoResult<Vec<Post>> {
        self.ensure_open()?;
        let posts = self.posts.read().await;
        let mut matched: Vec<(&Post, f64)> = posts
            .values()
            .filter(|post| filter.matches(post))
            .filter_map(|post| self.score(filter, post).map(|score| (post, score)))
            .collect();
        matched.sort_by(|a, b| compare_posts(sort, *a, *b));
        Ok(window.apply(matched.into_iter().map(|(post, _)| post.clone())))
    }

    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<u64> {
        self.ensure_open()?;
        let posts = self.posts.read().await;
        let total = posts
            .values()
            .filter(|post| filter.matches(post) && self.score(filter, post).is_some())
            .count();
        Ok(total as u64)
    }

    async fn get_post(&self, id: Uuid) -> RepoResult<Option<Post>> {
        self.ensure_open()?;
        Ok(self.posts.read().await.get(&id).cloned())
    }

    async fn create_post(&self, post: NewPost) -> RepoResult<Post> {
        self.ensure_open()?;
        let post = post.into_post(Uuid::new_v4(), Utc::now());
        self.posts.write().await.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: Uuid, changes: PostChanges) -> RepoResult<Option<Post>> {
        self.ensure_open()?;
        let mut posts = self.posts.write().await;
        Ok(posts.get_mut(&id).map(|post| {
            changes.apply_to(post, Utc::now());
            post.clone()
        }))
    }

    async fn delete_post(&self, id: Uuid) -> RepoResult<bool> {
        self.ensure_open()?;
        Ok(self.posts.write().await.remove(&id).is_some())
    }

    async fn increment_views(&self, id: Uuid) -> RepoResult<Option<Post>> {
        self.ensure_open()?;
        let mut posts = self.posts.write().await;
        Ok(posts.get_mut(&id).map(|post| {
            post.views += 1;
            post.clone()
        }))
    }

    async fn toggle_like(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<usize>> {
        self.ensure_open()?;
        let mut posts = self.posts.write().await;
        let Some(post) = posts
            .get_mut(&id)
            .filter(|post| visibility::is_externally_visible(post))
        else {
            return Ok(None);
        };

        match post.likes.iter().position(|liker| *liker == user_id) {
            Some(index) => {
                post.likes.remove(index);
            }
            None => post.likes.push(user_id),
        }
        post.updated_at = Utc::now();
        Ok(Some(post.likes.len()))
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        self.ensure_open()?;
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.ensure_open()?;
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.ensure_open()?;
        let users = self.users.read().await;
        let email = normalize_email(email);
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        self.ensure_open()?;
        let email = normalize_email(&user.email);
        let mut users = self.users.write().await;
        Self::ensure_unique(&users, None, Some(&user.username), Some(&email))?;

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email,
            role: user.role,
            is_active: true,
            profile: user.profile,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_users(&self, search: Option<&str>, window: PageWindow) -> RepoResult<Vec<User>> {
        self.ensure_open()?;
        let users = self.users.read().await;
        let mut matched: Vec<&User> = users
            .values()
            .filter(|user| Self::user_matches(user, search))
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(window.apply(matched.into_iter().cloned()))
    }

    async fn count_users(&self, search: Option<&str>) -> RepoResult<u64> {
        self.ensure_open()?;
        let users = self.users.read().await;
        let total = users
            .values()
            .filter(|user| Self::user_matches(user, search))
            .count();
        Ok(total as u64)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> RepoResult<Option<User>> {
        self.ensure_open()?;
        let mut users = self.users.write().await;
        Self::ensure_unique(
            &users,
            Some(id),
            changes.username.as_deref(),
            changes.email.as_deref(),
        )?;
        Ok(users.get_mut(&id).map(|user| {
            changes.apply_to(user, Utc::now());
            user.clone()
        }))
    }

    async fn deactivate_user(&self, id: Uuid) -> RepoResult<bool> {
        self.ensure_open()?;
        let mut users = self.users.write().await;
        Ok(users
            .get_mut(&id)
            .map(|user| {
                user.is_active = false;
                user.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
