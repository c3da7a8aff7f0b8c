// Unit-level tests that need no database: search criteria validation,
// predicate construction, update materiality and the message wire format.

use event_locator_api::channel::{InMemoryChannel, MessageChannel};
use event_locator_api::error::ApiError;
use event_locator_api::models::{
    EventChange, EventField, GeoPoint, NotificationMessage, NotificationType,
};
use event_locator_api::services::query::{build_count_query, build_page_query};
use event_locator_api::services::{SearchCriteria, SearchParams};
use uuid::Uuid;

mod test_helpers;
use test_helpers::test_config;

fn base_params() -> SearchParams {
    SearchParams {
        latitude: Some(40.7128),
        longitude: Some(-74.0060),
        ..Default::default()
    }
}

fn fields_of(err: ApiError) -> Vec<String> {
    match err {
        ApiError::Validation(details) => details.into_iter().map(|d| d.field).collect(),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn criteria_applies_defaults() {
    let criteria = SearchCriteria::from_params(&base_params(), &test_config()).unwrap();
    assert_eq!(criteria.page, 1);
    assert_eq!(criteria.limit, 10);
    assert_eq!(criteria.radius_km, 10.0);
    assert_eq!(criteria.offset(), 0);
    assert!(criteria.categories.is_none());
}

#[test]
fn criteria_requires_coordinates() {
    let err = SearchCriteria::from_params(&SearchParams::default(), &test_config()).unwrap_err();
    let fields = fields_of(err);
    assert!(fields.contains(&"latitude".to_string()));
    assert!(fields.contains(&"longitude".to_string()));
}

#[test]
fn criteria_rejects_out_of_range_coordinates() {
    let mut params = base_params();
    params.latitude = Some(90.5);
    assert!(fields_of(
        SearchCriteria::from_params(&params, &test_config()).unwrap_err()
    )
    .contains(&"latitude".to_string()));

    let mut params = base_params();
    params.longitude = Some(-180.5);
    assert!(fields_of(
        SearchCriteria::from_params(&params, &test_config()).unwrap_err()
    )
    .contains(&"longitude".to_string()));
}

#[test]
fn criteria_rejects_bad_radius() {
    let mut params = base_params();
    params.radius = Some(0.0);
    assert!(SearchCriteria::from_params(&params, &test_config()).is_err());

    params.radius = Some(-3.0);
    assert!(SearchCriteria::from_params(&params, &test_config()).is_err());

    // Above the configured maximum
    params.radius = Some(10_000.0);
    assert!(SearchCriteria::from_params(&params, &test_config()).is_err());
}

#[test]
fn criteria_rejects_inverted_price_bounds() {
    let mut params = base_params();
    params.min_price = Some(50.0);
    params.max_price = Some(10.0);
    assert!(fields_of(
        SearchCriteria::from_params(&params, &test_config()).unwrap_err()
    )
    .contains(&"min_price".to_string()));

    let mut params = base_params();
    params.min_price = Some(-1.0);
    assert!(SearchCriteria::from_params(&params, &test_config()).is_err());
}

#[test]
fn criteria_rejects_inverted_date_bounds() {
    let mut params = base_params();
    params.start_date = Some("2026-09-02T00:00:00Z".parse().unwrap());
    params.end_date = Some("2026-09-01T00:00:00Z".parse().unwrap());
    assert!(fields_of(
        SearchCriteria::from_params(&params, &test_config()).unwrap_err()
    )
    .contains(&"end_date".to_string()));
}

#[test]
fn criteria_parses_category_list() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut params = base_params();
    params.categories = Some(format!("{}, {}", a, b));
    let criteria = SearchCriteria::from_params(&params, &test_config()).unwrap();
    assert_eq!(criteria.categories, Some(vec![a, b]));

    params.categories = Some("not-a-uuid".to_string());
    assert!(fields_of(
        SearchCriteria::from_params(&params, &test_config()).unwrap_err()
    )
    .contains(&"categories".to_string()));
}

#[test]
fn criteria_validates_and_clamps_pagination() {
    let mut params = base_params();
    params.page = Some(0);
    assert!(SearchCriteria::from_params(&params, &test_config()).is_err());

    let mut params = base_params();
    params.limit = Some(0);
    assert!(SearchCriteria::from_params(&params, &test_config()).is_err());

    let mut params = base_params();
    params.limit = Some(1_000);
    let criteria = SearchCriteria::from_params(&params, &test_config()).unwrap();
    assert_eq!(criteria.limit, 100);

    let mut params = base_params();
    params.page = Some(3);
    params.limit = Some(20);
    let criteria = SearchCriteria::from_params(&params, &test_config()).unwrap();
    assert_eq!(criteria.offset(), 40);
}

/// Replace every `$<digits>` placeholder so queries with different
/// parameter numbering can be compared structurally.
fn normalize_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '$' {
            while chars.peek().is_some_and(|n| n.is_ascii_digit()) {
                chars.next();
            }
            out.push('?');
        }
    }
    out
}

#[test]
fn page_and_count_queries_share_predicates() {
    let a = Uuid::new_v4();
    let mut params = base_params();
    params.radius = Some(25.0);
    params.categories = Some(a.to_string());
    params.start_date = Some("2026-09-01T00:00:00Z".parse().unwrap());
    params.min_price = Some(5.0);
    params.max_price = Some(50.0);
    let criteria = SearchCriteria::from_params(&params, &test_config()).unwrap();

    let mut page = build_page_query(&criteria);
    let mut count = build_count_query(&criteria);
    let page_sql = normalize_placeholders(page.sql());
    let count_sql = normalize_placeholders(count.sql());

    let page_filters = page_sql
        .split_once("WHERE 1=1")
        .map(|(_, rest)| rest)
        .and_then(|rest| rest.split_once(" ORDER BY"))
        .map(|(filters, _)| filters)
        .expect("page query missing WHERE/ORDER BY structure");
    let count_filters = count_sql
        .split_once("WHERE 1=1")
        .map(|(_, rest)| rest)
        .expect("count query missing WHERE structure");

    assert_eq!(page_filters, count_filters);
}

#[test]
fn page_query_orders_by_distance_then_id() {
    let criteria = SearchCriteria::from_params(&base_params(), &test_config()).unwrap();
    let mut page = build_page_query(&criteria);
    assert!(page
        .sql()
        .contains("ORDER BY distance_km ASC, e.id ASC"));
}

#[test]
fn geo_point_validation() {
    assert!(GeoPoint::new(-74.0, 40.7).validate().is_ok());
    assert!(GeoPoint::new(-74.0, 95.0).validate().is_err());
    assert!(GeoPoint::new(200.0, 40.7).validate().is_err());
    assert!(GeoPoint::new(f64::NAN, 40.7).validate().is_err());
}

#[test]
fn description_only_update_is_not_material() {
    let change = EventChange::Updated {
        changed: vec![EventField::Description, EventField::Title],
    };
    assert!(!change.requires_matching());
    assert_eq!(change.update_summary(), None);
}

#[test]
fn relevant_field_update_is_material() {
    for field in [
        EventField::Location,
        EventField::StartDate,
        EventField::EndDate,
        EventField::Price,
        EventField::Categories,
    ] {
        let change = EventChange::Updated { changed: vec![field] };
        assert!(change.requires_matching(), "{:?} should be material", field);
    }

    let change = EventChange::Updated {
        changed: vec![EventField::Description, EventField::Price],
    };
    assert_eq!(change.update_summary(), Some("price".to_string()));
}

#[test]
fn created_always_matches() {
    assert!(EventChange::Created.requires_matching());
}

#[test]
fn notification_message_wire_format() {
    let message = NotificationMessage {
        user_id: Uuid::new_v4(),
        event_id: Uuid::new_v4(),
        notification_type: NotificationType::Created,
        title: "Jazz Night".to_string(),
        start_time: Some("2026-09-01T19:00:00Z".parse().unwrap()),
        update_type: None,
        language: "en".to_string(),
    };

    let value: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&message).unwrap()).unwrap();
    assert!(value.get("userId").is_some());
    assert!(value.get("eventId").is_some());
    assert_eq!(value["type"], "created");
    assert_eq!(value["title"], "Jazz Night");
    assert!(value.get("startTime").is_some());
    assert!(value.get("updateType").is_none());
    assert_eq!(value["language"], "en");

    let deleted = NotificationMessage {
        notification_type: NotificationType::Deleted,
        start_time: None,
        update_type: None,
        ..message
    };
    let value: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&deleted).unwrap()).unwrap();
    assert_eq!(value["type"], "deleted");
    assert!(value.get("startTime").is_none());
}

#[test]
fn in_memory_channel_collects_messages() {
    let channel = InMemoryChannel::new();
    let message = NotificationMessage {
        user_id: Uuid::new_v4(),
        event_id: Uuid::new_v4(),
        notification_type: NotificationType::Upcoming,
        title: "Morning Run".to_string(),
        start_time: None,
        update_type: None,
        language: "en".to_string(),
    };

    tokio_test::block_on(channel.publish(&message)).unwrap();
    tokio_test::block_on(channel.publish(&message)).unwrap();

    assert_eq!(channel.messages().len(), 2);
    assert_eq!(channel.messages()[0], message);
}
