//! Shared domain types: ID aliases, geographic point, event snapshot/change,
//! notification record and wire message.

pub mod event;
pub mod ids;
pub mod notification;

pub use event::{EventChange, EventField, EventSnapshot, GeoPoint};
pub use ids::{CategoryId, EventId, NotificationId, UserId};
pub use notification::{NotificationMessage, NotificationRecord, NotificationType};
