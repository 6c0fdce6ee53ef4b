use chrono::{Duration, Utc};
use postboard::{
    ApiError,
    models::{Post, PostStatus},
    query::{
        DEFAULT_FEATURED_LIMIT, DEFAULT_LIMIT, ListPostsParams, MAX_LIMIT, PageWindow,
        Pagination, PostFilter, SearchMode, SortOrder, compare_posts,
    },
};
use uuid::Uuid;

fn post_at(id: u128, minutes_ago: i64) -> Post {
    Post {
        id: Uuid::from_u128(id),
        title: "title".to_string(),
        content: "content".to_string(),
        status: PostStatus::Published,
        is_public: true,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
        ..Default::default()
    }
}

// --- Page Window ---

#[test]
fn test_page_window_defaults_for_missing_or_malformed_values() {
    for (page, limit) in [
        (None, None),
        (Some("abc"), Some("xyz")),
        (Some("0"), Some("0")),
        (Some("-3"), Some("-1")),
    ] {
        let window = PageWindow::parse(page, limit, DEFAULT_LIMIT);
        assert_eq!(window.page(), 1, "page for {:?}", page);
        assert_eq!(window.limit(), DEFAULT_LIMIT, "limit for {:?}", limit);
    }
}

#[test]
fn test_page_window_skip_and_cap() {
    let window = PageWindow::parse(Some("3"), Some("20"), DEFAULT_LIMIT);
    assert_eq!(window.skip(), 40);

    let capped = PageWindow::parse(Some("1"), Some("5000"), DEFAULT_LIMIT);
    assert_eq!(capped.limit(), MAX_LIMIT);

    let featured = PageWindow::parse(None, None, DEFAULT_FEATURED_LIMIT);
    assert_eq!(featured.limit(), 5);
}

#[test]
fn test_page_window_apply_slices_sorted_input() {
    let window = PageWindow::new(2, 3);
    assert_eq!(window.apply(1..=8), vec![4, 5, 6]);
    assert!(PageWindow::new(4, 3).apply(1..=8).is_empty());
}

#[test]
fn test_pages_is_ceiling_of_total_over_limit() {
    for total in 0u64..=25 {
        for limit in 1u32..=7 {
            let pagination = Pagination::new(PageWindow::new(1, limit), total);
            let expected = (total + u64::from(limit) - 1) / u64::from(limit);
            assert_eq!(pagination.pages, expected, "total={total} limit={limit}");
        }
    }
}

// --- Filter Composition ---

#[test]
fn test_filter_from_params_parses_every_constraint() {
    let author = Uuid::new_v4();
    let params = ListPostsParams {
        status: Some("published".to_string()),
        author: Some(author.to_string()),
        tag: Some("rust".to_string()),
        featured: Some("true".to_string()),
        ..Default::default()
    };

    let filter = PostFilter::from_list_params(&params).unwrap();
    assert_eq!(filter.status(), Some(PostStatus::Published));
    assert_eq!(filter.author(), Some(author));
    assert_eq!(filter.tag(), Some("rust"));
    assert_eq!(filter.featured(), Some(true));
    assert_eq!(filter.text(), None);
}

#[test]
fn test_filter_ignores_unrecognised_featured_value() {
    let params = ListPostsParams {
        featured: Some("yes".to_string()),
        ..Default::default()
    };
    let filter = PostFilter::from_list_params(&params).unwrap();
    assert_eq!(filter.featured(), None);
}

#[test]
fn test_filter_reports_every_invalid_field() {
    let params = ListPostsParams {
        status: Some("deleted".to_string()),
        author: Some("not-a-uuid".to_string()),
        ..Default::default()
    };

    match PostFilter::from_list_params(&params) {
        Err(ApiError::Validation(errors)) => {
            let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(fields, vec!["status", "author"]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_filter_baseline_excludes_hidden_posts_whatever_the_status_filter() {
    let mut draft = post_at(1, 0);
    draft.status = PostStatus::Draft;
    let mut private = post_at(2, 0);
    private.is_public = false;
    let visible = post_at(3, 0);

    let any = PostFilter::visible();
    assert!(!any.matches(&draft));
    assert!(!any.matches(&private));
    assert!(any.matches(&visible));

    let drafts = PostFilter::visible().with_status(PostStatus::Draft);
    assert!(!drafts.matches(&draft), "status filter never widens the baseline");
    assert!(!drafts.matches(&visible));
}

#[test]
fn test_filter_tag_membership_and_author() {
    let author = Uuid::from_u128(77);
    let mut tagged = post_at(1, 0);
    tagged.tags = vec!["rust".to_string(), "axum".to_string()];
    tagged.author_id = author;

    assert!(PostFilter::visible().with_tag("axum").matches(&tagged));
    assert!(!PostFilter::visible().with_tag("go").matches(&tagged));
    assert!(PostFilter::visible().with_author(author).matches(&tagged));
    assert!(!PostFilter::visible().with_author(Uuid::nil()).matches(&tagged));
}

// --- Relevance ---

#[test]
fn test_full_text_weights_title_over_content() {
    let mode = SearchMode::FullText;
    let title_hit = mode.score("rust", "Learning Rust", "nothing here").unwrap();
    let content_hit = mode.score("rust", "Nothing here", "some rust inside").unwrap();
    assert!(title_hit > content_hit);
    assert_eq!(mode.score("rust", "Go", "Python"), None);
    assert_eq!(mode.score("  ", "rust", "rust"), None);
}

#[test]
fn test_full_text_matches_any_term() {
    let mode = SearchMode::FullText;
    assert!(mode.score("async tokio", "Tokio internals", "").is_some());
}

#[test]
fn test_pattern_mode_is_case_insensitive_substring() {
    let mode = SearchMode::Pattern;
    assert_eq!(mode.score("TEST", "a testing title", "body"), Some(2.0));
    assert_eq!(mode.score("test", "title", "a Test body"), Some(1.0));
    assert_eq!(mode.score("test", "contest", "latest"), Some(3.0));
    assert_eq!(mode.score("test", "title", "body"), None);
}

#[test]
fn test_search_mode_parse() {
    assert_eq!(SearchMode::parse("FullText"), Some(SearchMode::FullText));
    assert_eq!(SearchMode::parse("pattern"), Some(SearchMode::Pattern));
    assert_eq!(SearchMode::parse("bogus"), None);
}

// --- Ordering ---

#[test]
fn test_newest_first_with_stable_id_tie_break() {
    let now = Utc::now();
    let mut a = post_at(1, 0);
    let mut b = post_at(2, 0);
    a.created_at = now;
    b.created_at = now;
    let older = post_at(3, 10);

    let mut posts = vec![&older, &a, &b];
    posts.sort_by(|x, y| compare_posts(SortOrder::Newest, (*x, 0.0), (*y, 0.0)));
    let ids: Vec<u128> = posts.iter().map(|p| p.id.as_u128()).collect();
    assert_eq!(ids, vec![2, 1, 3]);
}

#[test]
fn test_relevance_then_newest() {
    let fresh = post_at(1, 0);
    let stale = post_at(2, 60);

    let mut scored = vec![(&fresh, 1.0), (&stale, 3.0)];
    scored.sort_by(|x, y| compare_posts(SortOrder::Relevance, *x, *y));
    assert_eq!(scored[0].0.id, stale.id);

    let mut tied = vec![(&stale, 2.0), (&fresh, 2.0)];
    tied.sort_by(|x, y| compare_posts(SortOrder::Relevance, *x, *y));
    assert_eq!(tied[0].0.id, fresh.id);
}
