//! Event domain types shared between handlers, matching and dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, FieldError};
use crate::models::ids::{CategoryId, EventId, UserId};

/// A WGS 84 point, longitude/latitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// Range-check the coordinates, appending field errors for a caller that
    /// collects them.
    pub fn check(&self, errors: &mut Vec<FieldError>) {
        if !(-90.0..=90.0).contains(&self.latitude) || !self.latitude.is_finite() {
            errors.push(FieldError::new("latitude", "must be between -90 and 90"));
        }
        if !(-180.0..=180.0).contains(&self.longitude) || !self.longitude.is_finite() {
            errors.push(FieldError::new("longitude", "must be between -180 and 180"));
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        self.check(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

/// Point-in-time copy of an event, captured when the match-and-dispatch
/// pipeline runs so later edits cannot alter already-sent content.
#[derive(Debug, Clone)]
pub struct EventSnapshot {
    pub id: EventId,
    pub title: String,
    pub location: GeoPoint,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub price: Option<f64>,
    pub created_by: UserId,
    pub category_ids: Vec<CategoryId>,
}

/// Fields of an event that can change on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventField {
    Title,
    Description,
    Address,
    Location,
    StartDate,
    EndDate,
    MaxParticipants,
    Price,
    Categories,
}

impl EventField {
    /// Whether a change to this field can alter who should be notified.
    pub fn is_notification_relevant(self) -> bool {
        matches!(
            self,
            EventField::Location
                | EventField::StartDate
                | EventField::EndDate
                | EventField::Price
                | EventField::Categories
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventField::Title => "title",
            EventField::Description => "description",
            EventField::Address => "address",
            EventField::Location => "location",
            EventField::StartDate => "start_date",
            EventField::EndDate => "end_date",
            EventField::MaxParticipants => "max_participants",
            EventField::Price => "price",
            EventField::Categories => "categories",
        }
    }
}

/// Lifecycle change that triggered the notification pipeline.
#[derive(Debug, Clone)]
pub enum EventChange {
    Created,
    Updated { changed: Vec<EventField> },
    Deleted,
}

impl EventChange {
    /// Created events always match. Updates only re-match when a
    /// notification-relevant field changed; edits to e.g. the description
    /// alone never re-notify.
    pub fn requires_matching(&self) -> bool {
        match self {
            EventChange::Created => true,
            EventChange::Updated { changed } => {
                changed.iter().any(|f| f.is_notification_relevant())
            }
            EventChange::Deleted => true,
        }
    }

    /// Comma-joined list of the notification-relevant fields that changed,
    /// carried as `updateType` in the published message.
    pub fn update_summary(&self) -> Option<String> {
        match self {
            EventChange::Updated { changed } => {
                let relevant: Vec<&str> = changed
                    .iter()
                    .filter(|f| f.is_notification_relevant())
                    .map(|f| f.as_str())
                    .collect();
                if relevant.is_empty() {
                    None
                } else {
                    Some(relevant.join(","))
                }
            }
            _ => None,
        }
    }
}
