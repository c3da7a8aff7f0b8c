// Integration tests for radius search: distance bounds, ordering, count/page
// agreement and filter behavior.
//
// These require a PostGIS-enabled test database (TEST_DATABASE_URL) and are
// ignored by default.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use event_locator_api::services::{EventSearchService, SearchCriteria, SearchParams};

mod test_helpers;
use test_helpers::*;

// Manhattan
const CENTER: (f64, f64) = (-74.0060, 40.7128);
// ~2.1 km from CENTER
const NEARBY: (f64, f64) = (-73.9950, 40.7300);

fn params_at(center: (f64, f64)) -> SearchParams {
    SearchParams {
        longitude: Some(center.0),
        latitude: Some(center.1),
        ..Default::default()
    }
}

async fn search(
    pool: &PgPool,
    params: &SearchParams,
) -> event_locator_api::services::SearchPage {
    let criteria = SearchCriteria::from_params(params, &test_config()).unwrap();
    EventSearchService::new(Arc::new(pool.clone()))
        .search(&criteria)
        .await
        .expect("search failed")
}

#[tokio::test]
#[ignore] // Requires test database
async fn nearby_event_found_with_distance_and_category_filter() {
    let pool = setup_test_db().await;
    let author = create_test_user(&pool, "author@example.com", None).await;
    let music = create_test_category(&pool, "Music").await;
    let event_id =
        create_test_event(&pool, author, "Jazz Night", NEARBY, Some(0.0), &[music]).await;

    // Radius 10 km: included, with distance ≈ 2.1 km
    let mut params = params_at(CENTER);
    params.radius = Some(10.0);
    let page = search(&pool, &params).await;
    assert_eq!(page.total, 1);
    assert_eq!(page.events[0].id, event_id);
    let distance = page.events[0].distance;
    assert!(
        (1.9..=2.3).contains(&distance),
        "expected ~2.1 km, got {distance}"
    );
    assert!(distance <= 10.0);
    assert_eq!(page.events[0].category_ids, vec![music]);
    assert_eq!(page.events[0].price, Some(0.0));

    // Category filter matching the event: still included
    params.categories = Some(music.to_string());
    let page = search(&pool, &params).await;
    assert_eq!(page.total, 1);

    // Unrelated category: excluded
    params.categories = Some(Uuid::new_v4().to_string());
    let page = search(&pool, &params).await;
    assert_eq!(page.total, 0);
    assert!(page.events.is_empty());

    // Radius 1 km: excluded
    let mut params = params_at(CENTER);
    params.radius = Some(1.0);
    let page = search(&pool, &params).await;
    assert_eq!(page.total, 0);
}

#[tokio::test]
#[ignore]
async fn results_ordered_by_distance_with_id_tie_break() {
    let pool = setup_test_db().await;
    let author = create_test_user(&pool, "author@example.com", None).await;

    // Spread events east of the center at growing offsets
    for i in 1..=5 {
        let lng = CENTER.0 + 0.01 * i as f64;
        create_test_event(&pool, author, &format!("Event {i}"), (lng, CENTER.1), None, &[])
            .await;
    }
    // Two events at the exact same point: tie broken by id ascending
    let twin_a =
        create_test_event(&pool, author, "Twin A", (CENTER.0 + 0.02, CENTER.1), None, &[]).await;
    let twin_b =
        create_test_event(&pool, author, "Twin B", (CENTER.0 + 0.02, CENTER.1), None, &[]).await;

    let mut params = params_at(CENTER);
    params.radius = Some(50.0);
    let page = search(&pool, &params).await;
    assert_eq!(page.total, 7);

    for pair in page.events.windows(2) {
        assert!(
            pair[0].distance <= pair[1].distance + 1e-9,
            "events must be non-decreasing by distance"
        );
        if (pair[0].distance - pair[1].distance).abs() < 1e-9 {
            assert!(pair[0].id < pair[1].id, "distance ties must order by id");
        }
    }

    let twins: Vec<Uuid> = page
        .events
        .iter()
        .filter(|e| e.id == twin_a || e.id == twin_b)
        .map(|e| e.id)
        .collect();
    let mut expected = vec![twin_a, twin_b];
    expected.sort();
    assert_eq!(twins, expected);
}

#[tokio::test]
#[ignore]
async fn total_matches_count_across_pages() {
    let pool = setup_test_db().await;
    let author = create_test_user(&pool, "author@example.com", None).await;

    for i in 0..13 {
        let lng = CENTER.0 + 0.002 * i as f64;
        create_test_event(&pool, author, &format!("Event {i}"), (lng, CENTER.1), None, &[])
            .await;
    }

    let mut params = params_at(CENTER);
    params.radius = Some(50.0);
    params.limit = Some(5);

    let mut seen = Vec::new();
    for page_number in 1..=3 {
        params.page = Some(page_number);
        let page = search(&pool, &params).await;
        // Total reflects the full predicate set regardless of pagination
        assert_eq!(page.total, 13);
        seen.extend(page.events.iter().map(|e| e.id));
    }
    assert_eq!(seen.len(), 13);
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 13, "pages must not overlap or drop events");
}

#[tokio::test]
#[ignore]
async fn price_and_date_filters_constrain_results() {
    let pool = setup_test_db().await;
    let author = create_test_user(&pool, "author@example.com", None).await;

    create_test_event(&pool, author, "Free", NEARBY, Some(0.0), &[]).await;
    let mid = create_test_event(&pool, author, "Mid", NEARBY, Some(30.0), &[]).await;
    create_test_event(&pool, author, "Pricey", NEARBY, Some(100.0), &[]).await;
    // No price: excluded whenever a price bound applies
    create_test_event(&pool, author, "Unpriced", NEARBY, None, &[]).await;

    let mut params = params_at(CENTER);
    params.radius = Some(10.0);
    params.min_price = Some(10.0);
    params.max_price = Some(50.0);
    let page = search(&pool, &params).await;
    assert_eq!(page.total, 1);
    assert_eq!(page.events[0].id, mid);

    // Date window in the far future matches nothing (helpers start tomorrow)
    let mut params = params_at(CENTER);
    params.radius = Some(10.0);
    params.start_date = Some(chrono::Utc::now() + chrono::Duration::days(30));
    let page = search(&pool, &params).await;
    assert_eq!(page.total, 0);

    // Window covering the events matches all four
    let mut params = params_at(CENTER);
    params.radius = Some(10.0);
    params.start_date = Some(chrono::Utc::now());
    params.end_date = Some(chrono::Utc::now() + chrono::Duration::days(7));
    let page = search(&pool, &params).await;
    assert_eq!(page.total, 4);
}

#[tokio::test]
#[ignore]
async fn rating_aggregates_computed_per_event() {
    let pool = setup_test_db().await;
    let author = create_test_user(&pool, "author@example.com", None).await;
    let alice = create_test_user(&pool, "alice@example.com", None).await;
    let bob = create_test_user(&pool, "bob@example.com", None).await;

    let rated = create_test_event(&pool, author, "Rated", NEARBY, None, &[]).await;
    let unrated = create_test_event(&pool, author, "Unrated", NEARBY, None, &[]).await;
    rate_event(&pool, alice, rated, 4).await;
    rate_event(&pool, bob, rated, 5).await;

    let mut params = params_at(CENTER);
    params.radius = Some(10.0);
    let page = search(&pool, &params).await;

    let rated_summary = page.events.iter().find(|e| e.id == rated).unwrap();
    assert!((rated_summary.average_rating - 4.5).abs() < 1e-9);
    assert_eq!(rated_summary.rating_count, 2);

    let unrated_summary = page.events.iter().find(|e| e.id == unrated).unwrap();
    assert_eq!(unrated_summary.average_rating, 0.0);
    assert_eq!(unrated_summary.rating_count, 0);
}

#[tokio::test]
#[ignore]
async fn single_event_lookup_round_trips_through_cache_layer() {
    let pool = setup_test_db().await;
    let author = create_test_user(&pool, "author@example.com", None).await;
    let music = create_test_category(&pool, "Music").await;
    let event_id =
        create_test_event(&pool, author, "Jazz Night", NEARBY, Some(15.0), &[music]).await;

    let service = EventSearchService::new(Arc::new(pool.clone()));
    let cache = event_locator_api::cache::CacheLayer::disabled();

    let detail = service
        .get_event(event_id, &cache)
        .await
        .unwrap()
        .expect("event should exist");
    assert_eq!(detail.title, "Jazz Night");
    assert_eq!(detail.price, Some(15.0));
    assert_eq!(detail.category_ids, vec![music]);
    assert_eq!(detail.rating_count, 0);

    let missing = service.get_event(Uuid::new_v4(), &cache).await.unwrap();
    assert!(missing.is_none());
}
