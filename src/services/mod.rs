//! Core services: search query construction, event search, preference
//! matching and notification dispatch.

pub mod dispatcher;
pub mod matcher;
pub mod query;
pub mod search;

pub use dispatcher::{DispatchOutcome, DispatchSummary, NotificationDispatcher};
pub use matcher::PreferenceMatcher;
pub use query::{SearchCriteria, SearchParams};
pub use search::{EventDetail, EventSearchService, EventSummary, SearchPage};

use crate::models::{EventChange, EventSnapshot};
use crate::AppState;

/// Match-and-dispatch pipeline for one event change. Best-effort: failures
/// are logged and folded into the summary so the triggering mutation is
/// never blocked or rolled back by its notification side effects.
pub async fn notify_event_change(
    state: &AppState,
    event: &EventSnapshot,
    change: &EventChange,
) -> DispatchSummary {
    let matcher = PreferenceMatcher::new(state.db_pool.clone());
    let user_ids = match matcher.match_event(event, change).await {
        Ok(user_ids) => user_ids,
        Err(e) => {
            tracing::warn!("Preference matching failed for event {}: {}", event.id, e);
            return DispatchSummary::default();
        }
    };

    if user_ids.is_empty() {
        return DispatchSummary::default();
    }

    NotificationDispatcher::new(state.db_pool.clone(), state.channel.clone())
        .dispatch(&user_ids, change, event)
        .await
}
