use chrono::{Duration, Utc};
use postboard::{
    auth::AuthUser,
    memory::InMemoryRepository,
    models::{CreatePostRequest, NewUser, Post, PostStatus, Role, UpdateUserRequest, User},
    query::{PageWindow, PostFilter, SearchMode, SortOrder},
    repository::{PostgresRepository, Repository, RepositoryError, RepositoryState, UserChanges},
    visibility::{NewPost, PostChanges},
};
use std::sync::Arc;
use uuid::Uuid;

// --- Shared Scenarios (run against every store) ---

fn new_user(tag: &str) -> NewUser {
    let unique = Uuid::new_v4().simple().to_string();
    NewUser {
        username: format!("{tag}_{}", &unique[..12]),
        email: format!("{tag}.{unique}@example.com"),
        role: Role::User,
        ..Default::default()
    }
}

fn author(user: &User) -> AuthUser {
    AuthUser {
        id: user.id,
        role: user.role,
    }
}

fn draft_request(title: &str, status: PostStatus, is_public: bool) -> CreatePostRequest {
    CreatePostRequest {
        title: title.to_string(),
        content: "Repository scenario content body.".to_string(),
        status: Some(status),
        is_public: Some(is_public),
        ..Default::default()
    }
}

async fn create_post(
    repo: &RepositoryState,
    owner: &User,
    title: &str,
    status: PostStatus,
    is_public: bool,
) -> Post {
    repo.create_post(NewPost::from_request(
        draft_request(title, status, is_public),
        &author(owner),
    )
    .unwrap())
    .await
    .expect("Failed to create post")
}

/// Distinct principals toggle concurrently; none of the updates may be lost, and a
/// second round of toggles returns the set to empty.
async fn concurrent_likes_scenario(repo: RepositoryState, likers: usize) {
    let owner = repo.create_user(new_user("owner")).await.unwrap();
    let post = create_post(&repo, &owner, "Concurrent likes", PostStatus::Published, true).await;
    let post_id = post.id;
    let principals: Vec<Uuid> = (0..likers).map(|_| Uuid::new_v4()).collect();

    for round in [likers, 0] {
        let mut handles = Vec::new();
        for user_id in principals.clone() {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.toggle_like(post_id, user_id).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap().expect("post is visible");
        }

        let stored = repo.get_post(post_id).await.unwrap().unwrap();
        assert_eq!(stored.like_count(), round);
        let mut unique = stored.likes.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), stored.likes.len(), "likers must be unique");
    }
}

async fn concurrent_views_scenario(repo: RepositoryState, reads: i64) {
    let owner = repo.create_user(new_user("viewer")).await.unwrap();
    let post = create_post(&repo, &owner, "Concurrent views", PostStatus::Published, true).await;

    let post_id = post.id;
    let mut handles = Vec::new();
    for _ in 0..reads {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move { repo.increment_views(post_id).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(repo.get_post(post_id).await.unwrap().unwrap().views, reads);
}

async fn visibility_scenario(repo: RepositoryState) {
    let owner = repo.create_user(new_user("lister")).await.unwrap();
    let marker = format!("zq{}", &Uuid::new_v4().simple().to_string()[..10]);

    let visible = create_post(&repo, &owner, &format!("{marker} visible"), PostStatus::Published, true).await;
    create_post(&repo, &owner, &format!("{marker} draft"), PostStatus::Draft, true).await;
    create_post(&repo, &owner, &format!("{marker} private"), PostStatus::Published, false).await;
    create_post(&repo, &owner, &format!("{marker} archived"), PostStatus::Archived, true).await;

    let by_author = PostFilter::visible().with_author(owner.id);
    let posts = repo
        .find_posts(&by_author, SortOrder::Newest, PageWindow::default())
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, visible.id);
    assert_eq!(repo.count_posts(&by_author).await.unwrap(), 1);

    let search = PostFilter::visible().with_text(marker);
    let hits = repo
        .find_posts(&search, SortOrder::Relevance, PageWindow::default())
        .await
        .unwrap();
    assert_eq!(hits.iter().map(|p| p.id).collect::<Vec<_>>(), vec![visible.id]);

    // Likes on hidden posts are refused by the store itself.
    let hidden = create_post(&repo, &owner, "hidden like target", PostStatus::Draft, true).await;
    assert_eq!(repo.toggle_like(hidden.id, Uuid::new_v4()).await.unwrap(), None);
}

/// Full-text search matches a post when any query term does, whichever store runs it.
async fn multi_term_search_scenario(repo: RepositoryState) {
    let owner = repo.create_user(new_user("searcher")).await.unwrap();
    let marker = format!("zebra{}", &Uuid::new_v4().simple().to_string()[..10]);
    let other = format!("okapi{}", &Uuid::new_v4().simple().to_string()[..10]);
    let absent = format!("giraffe{}", &Uuid::new_v4().simple().to_string()[..10]);

    let first = create_post(&repo, &owner, &format!("{marker} story"), PostStatus::Published, true).await;
    let second = create_post(&repo, &owner, &format!("{other} story"), PostStatus::Published, true).await;

    let one_term_matches = PostFilter::visible().with_text(format!("{marker} {absent}"));
    let hits = repo
        .find_posts(&one_term_matches, SortOrder::Relevance, PageWindow::default())
        .await
        .unwrap();
    assert_eq!(hits.iter().map(|p| p.id).collect::<Vec<_>>(), vec![first.id]);
    assert_eq!(repo.count_posts(&one_term_matches).await.unwrap(), 1);

    let both = PostFilter::visible().with_text(format!("{marker} {other}"));
    let mut ids: Vec<Uuid> = repo
        .find_posts(&both, SortOrder::Relevance, PageWindow::default())
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    ids.sort();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(ids, expected);

    let none = PostFilter::visible().with_text(absent);
    assert_eq!(repo.count_posts(&none).await.unwrap(), 0);
}

async fn update_scenario(repo: RepositoryState) {
    let owner = repo.create_user(new_user("editor")).await.unwrap();
    let post = create_post(&repo, &owner, "Original title", PostStatus::Draft, false).await;
    assert_eq!(post.slug, "original-title");

    let changes = PostChanges {
        title: Some("Renamed Post".to_string()),
        slug: Some("renamed-post".to_string()),
        is_public: Some(true),
        ..Default::default()
    };
    let updated = repo.update_post(post.id, changes).await.unwrap().unwrap();
    assert_eq!(updated.title, "Renamed Post");
    assert_eq!(updated.slug, "renamed-post");
    assert!(updated.is_public);
    assert_eq!(updated.status, PostStatus::Draft, "unspecified fields stay unchanged");
    assert_eq!(updated.author_id, owner.id);

    assert!(repo.update_post(Uuid::new_v4(), PostChanges::default()).await.unwrap().is_none());
    assert!(repo.delete_post(post.id).await.unwrap());
    assert!(!repo.delete_post(post.id).await.unwrap());
}

async fn user_scenario(repo: RepositoryState) {
    let first = repo.create_user(new_user("alpha")).await.unwrap();
    let second = repo.create_user(new_user("beta")).await.unwrap();

    let duplicate = NewUser {
        username: first.username.clone(),
        ..new_user("gamma")
    };
    assert!(matches!(
        repo.create_user(duplicate).await,
        Err(RepositoryError::Conflict(_))
    ));

    let shouted_email = NewUser {
        email: first.email.to_uppercase(),
        ..new_user("delta")
    };
    assert!(matches!(
        repo.create_user(shouted_email).await,
        Err(RepositoryError::Conflict(_))
    ));
    let by_email = repo
        .find_user_by_email(&format!("  {}  ", first.email.to_uppercase()))
        .await
        .unwrap()
        .map(|u| u.id);
    assert_eq!(by_email, Some(first.id));

    let mixed_case = repo
        .create_user(NewUser {
            email: format!("Mixed.Case.{}@Example.COM", Uuid::new_v4().simple()),
            ..new_user("epsilon")
        })
        .await
        .unwrap();
    assert_eq!(mixed_case.email, mixed_case.email.to_lowercase());

    let admin = AuthUser {
        id: Uuid::new_v4(),
        role: Role::Admin,
    };
    let steal_email = UserChanges::from_request(
        UpdateUserRequest {
            email: Some(first.email.clone()),
            ..Default::default()
        },
        &admin,
    );
    assert!(matches!(
        repo.update_user(second.id, steal_email).await,
        Err(RepositoryError::Conflict(_))
    ));

    assert!(repo.deactivate_user(second.id).await.unwrap());
    let stored = repo.get_user(second.id).await.unwrap().unwrap();
    assert!(!stored.is_active);

    let search = second.username.clone();
    assert_eq!(repo.count_users(Some(search.as_str())).await.unwrap(), 0);
    let found = repo
        .list_users(Some(first.username.to_uppercase().as_str()), PageWindow::default())
        .await
        .unwrap();
    assert_eq!(found.iter().map(|u| u.id).collect::<Vec<_>>(), vec![first.id]);
}

// --- In-Memory Store ---

fn memory() -> RepositoryState {
    Arc::new(InMemoryRepository::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_likes_lose_no_update() {
    concurrent_likes_scenario(memory(), 64).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_views_never_undercount() {
    concurrent_views_scenario(memory(), 100).await;
}

#[tokio::test]
async fn test_memory_listing_and_search_respect_visibility() {
    visibility_scenario(memory()).await;
}

#[tokio::test]
async fn test_memory_full_text_matches_any_term() {
    multi_term_search_scenario(memory()).await;
}

#[tokio::test]
async fn test_memory_partial_update_and_delete() {
    update_scenario(memory()).await;
}

#[tokio::test]
async fn test_memory_user_uniqueness_and_soft_delete() {
    user_scenario(memory()).await;
}

#[tokio::test]
async fn test_memory_pagination_is_stable_for_equal_timestamps() {
    let repo = InMemoryRepository::default();
    let created_at = Utc::now() - Duration::hours(1);
    for i in 1..=9u128 {
        repo.insert_post(Post {
            id: Uuid::from_u128(i),
            title: format!("same time {i}"),
            status: PostStatus::Published,
            is_public: true,
            created_at,
            updated_at: created_at,
            ..Default::default()
        })
        .await;
    }

    let filter = PostFilter::visible();
    let mut seen = Vec::new();
    for page in 1..=3 {
        let posts = repo
            .find_posts(&filter, SortOrder::Newest, PageWindow::new(page, 4))
            .await
            .unwrap();
        seen.extend(posts.into_iter().map(|p| p.id.as_u128()));
    }
    assert_eq!(seen, (1..=9u128).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_memory_pattern_mode_orders_title_hits_first() {
    let repo = InMemoryRepository::new(SearchMode::Pattern);
    let now = Utc::now();
    let mut content_hit = Post {
        id: Uuid::new_v4(),
        title: "unrelated".to_string(),
        content: "mentions rustacean".to_string(),
        status: PostStatus::Published,
        is_public: true,
        created_at: now,
        updated_at: now,
        ..Default::default()
    };
    let title_hit = Post {
        id: Uuid::new_v4(),
        title: "Rustacean weekly".to_string(),
        content: "nothing".to_string(),
        created_at: now - Duration::days(1),
        ..content_hit.clone()
    };
    content_hit.tags = vec!["misc".to_string()];
    repo.insert_post(content_hit.clone()).await;
    repo.insert_post(title_hit.clone()).await;

    let filter = PostFilter::visible().with_text("RUST");
    let posts = repo
        .find_posts(&filter, SortOrder::Relevance, PageWindow::default())
        .await
        .unwrap();
    assert_eq!(
        posts.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![title_hit.id, content_hit.id]
    );
}

#[tokio::test]
async fn test_memory_close_rejects_further_calls() {
    let repo = InMemoryRepository::default();
    repo.close().await;

    assert!(matches!(
        repo.get_post(Uuid::new_v4()).await,
        Err(RepositoryError::Closed)
    ));
    assert!(matches!(
        repo.count_posts(&PostFilter::visible()).await,
        Err(RepositoryError::Closed)
    ));
}

// --- Postgres Store ---

async fn postgres(search_mode: SearchMode) -> RepositoryState {
    dotenv::dotenv().ok();
    let db_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set to run integration tests");
    let repo = PostgresRepository::connect(&db_url, 10, search_mode)
        .await
        .expect("Failed to connect and migrate the test database.");
    Arc::new(repo)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_concurrent_likes_lose_no_update() {
    concurrent_likes_scenario(postgres(SearchMode::FullText).await, 32).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_concurrent_views_never_undercount() {
    concurrent_views_scenario(postgres(SearchMode::FullText).await, 50).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_listing_and_full_text_search_respect_visibility() {
    visibility_scenario(postgres(SearchMode::FullText).await).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_listing_and_pattern_search_respect_visibility() {
    visibility_scenario(postgres(SearchMode::Pattern).await).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_full_text_matches_any_term() {
    multi_term_search_scenario(postgres(SearchMode::FullText).await).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_partial_update_and_delete() {
    update_scenario(postgres(SearchMode::FullText).await).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_postgres_user_uniqueness_and_soft_delete() {
    user_scenario(postgres(SearchMode::FullText).await).await;
}
