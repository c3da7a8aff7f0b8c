//! Search criteria validation and predicate construction.
//!
//! Filters are accumulated onto a `sqlx::QueryBuilder` by one shared routine
//! (`push_filters`) so the page query and the count query are built from the
//! same predicate set and cannot drift apart.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, FieldError};
use crate::models::{CategoryId, GeoPoint};

/// Raw query-string parameters for the search endpoint. Categories come in
/// as a comma-separated list of IDs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius: Option<f64>,
    pub categories: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated per-request search criteria. Never persisted or shared across
/// requests.
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub center: GeoPoint,
    /// Kilometers; defaulted from config when the request omits it.
    pub radius_km: f64,
    pub categories: Option<Vec<CategoryId>>,
    pub starts_after: Option<DateTime<Utc>>,
    pub ends_before: Option<DateTime<Utc>>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub page: i64,
    pub limit: i64,
}

impl SearchCriteria {
    /// Validate raw parameters into criteria. All failures are collected and
    /// rejected together, before any I/O.
    pub fn from_params(params: &SearchParams, config: &Config) -> Result<Self, ApiError> {
        let mut errors: Vec<FieldError> = Vec::new();

        let latitude = params.latitude;
        let longitude = params.longitude;
        if latitude.is_none() {
            errors.push(FieldError::new("latitude", "latitude is required"));
        }
        if longitude.is_none() {
            errors.push(FieldError::new("longitude", "longitude is required"));
        }
        let center = GeoPoint::new(longitude.unwrap_or(0.0), latitude.unwrap_or(0.0));
        if latitude.is_some() && longitude.is_some() {
            center.check(&mut errors);
        }

        let radius_km = params.radius.unwrap_or(config.default_radius_km);
        if !radius_km.is_finite() || radius_km <= 0.0 {
            errors.push(FieldError::new("radius", "must be positive"));
        } else if radius_km > config.max_radius_km {
            errors.push(FieldError::new(
                "radius",
                format!("must be at most {} km", config.max_radius_km),
            ));
        }

        let categories = match params.categories.as_deref() {
            None | Some("") => None,
            Some(raw) => {
                let mut ids = Vec::new();
                for part in raw.split(',') {
                    match Uuid::parse_str(part.trim()) {
                        Ok(id) => ids.push(id),
                        Err(_) => {
                            errors.push(FieldError::new(
                                "categories",
                                format!("invalid category id: {}", part.trim()),
                            ));
                        }
                    }
                }
                Some(ids)
            }
        };

        if let (Some(start), Some(end)) = (params.start_date, params.end_date) {
            if end < start {
                errors.push(FieldError::new("end_date", "must not precede start_date"));
            }
        }

        if let Some(min) = params.min_price {
            if !min.is_finite() || min < 0.0 {
                errors.push(FieldError::new("min_price", "must be non-negative"));
            }
        }
        if let Some(max) = params.max_price {
            if !max.is_finite() || max < 0.0 {
                errors.push(FieldError::new("max_price", "must be non-negative"));
            }
        }
        if let (Some(min), Some(max)) = (params.min_price, params.max_price) {
            if min > max {
                errors.push(FieldError::new("min_price", "must not exceed max_price"));
            }
        }

        let page = params.page.unwrap_or(1);
        if page < 1 {
            errors.push(FieldError::new("page", "must be at least 1"));
        }
        let mut limit = params.limit.unwrap_or(config.default_page_size as i64);
        if limit < 1 {
            errors.push(FieldError::new("limit", "must be at least 1"));
        }
        // Oversized page sizes are clamped rather than rejected.
        if limit > config.max_page_size as i64 {
            limit = config.max_page_size as i64;
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        Ok(Self {
            center,
            radius_km,
            categories,
            starts_after: params.start_date,
            ends_before: params.end_date,
            min_price: params.min_price,
            max_price: params.max_price,
            page,
            limit,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// Push the search center as a bound geography point.
fn push_center(qb: &mut QueryBuilder<'static, Postgres>, center: GeoPoint) {
    qb.push("ST_SetSRID(ST_MakePoint(");
    qb.push_bind(center.longitude);
    qb.push(", ");
    qb.push_bind(center.latitude);
    qb.push("), 4326)::geography");
}

/// Append every filter predicate for the criteria. Shared by the page and
/// count queries; predicates here must stay free of ordering/pagination.
fn push_filters(qb: &mut QueryBuilder<'static, Postgres>, criteria: &SearchCriteria) {
    qb.push(" AND ST_DWithin(e.location, ");
    push_center(qb, criteria.center);
    qb.push(", ");
    qb.push_bind(criteria.radius_km * 1000.0);
    qb.push(")");

    if let Some(categories) = &criteria.categories {
        qb.push(
            " AND EXISTS (SELECT 1 FROM event_categories ec \
             WHERE ec.event_id = e.id AND ec.category_id = ANY(",
        );
        qb.push_bind(categories.clone());
        qb.push("))");
    }

    if let Some(starts_after) = criteria.starts_after {
        qb.push(" AND e.start_date >= ");
        qb.push_bind(starts_after);
    }
    if let Some(ends_before) = criteria.ends_before {
        qb.push(" AND e.end_date <= ");
        qb.push_bind(ends_before);
    }

    if let Some(min_price) = criteria.min_price {
        qb.push(" AND e.price >= ");
        qb.push_bind(min_price);
    }
    if let Some(max_price) = criteria.max_price {
        qb.push(" AND e.price <= ");
        qb.push_bind(max_price);
    }
}

/// Page query: events with distance, rating aggregates and category IDs,
/// ordered by distance then event id so pagination is stable for repeated
/// identical criteria.
pub fn build_page_query(criteria: &SearchCriteria) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT e.id, e.title, e.description, e.address, \
         ST_X(e.location::geometry) AS longitude, \
         ST_Y(e.location::geometry) AS latitude, \
         e.start_date, e.end_date, e.max_participants, e.price, e.created_by, \
         e.created_at, e.updated_at, \
         ST_Distance(e.location, ",
    );
    push_center(&mut qb, criteria.center);
    qb.push(
        ") / 1000.0 AS distance_km, \
         COALESCE((SELECT AVG(er.rating) FROM event_ratings er \
             WHERE er.event_id = e.id), 0)::double precision AS average_rating, \
         (SELECT COUNT(*) FROM event_ratings er \
             WHERE er.event_id = e.id) AS rating_count, \
         COALESCE((SELECT array_agg(ec.category_id) FROM event_categories ec \
             WHERE ec.event_id = e.id), '{}') AS category_ids \
         FROM events e WHERE 1=1",
    );
    push_filters(&mut qb, criteria);

    qb.push(" ORDER BY distance_km ASC, e.id ASC LIMIT ");
    qb.push_bind(criteria.limit);
    qb.push(" OFFSET ");
    qb.push_bind(criteria.offset());
    qb
}

/// Count query: same predicates as the page query, no ordering/pagination.
pub fn build_count_query(criteria: &SearchCriteria) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM events e WHERE 1=1");
    push_filters(&mut qb, criteria);
    qb
}
