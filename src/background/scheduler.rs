//! Background jobs. Currently one: the hourly "upcoming event" reminder,
//! which notifies users about favorited events starting soon. Reminders go
//! through the normal dispatcher, so the (user, event, type) reservation
//! guarantees each user is reminded about an event at most once.

use std::sync::Arc;

use sqlx::Row;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::channel::MessageChannel;
use crate::config::Config;
use crate::database::DatabasePool;
use crate::error::ApiError;
use crate::models::{EventSnapshot, GeoPoint, NotificationType};
use crate::services::{DispatchSummary, NotificationDispatcher, PreferenceMatcher};

pub struct BackgroundScheduler {
    #[allow(dead_code)]
    scheduler: Arc<JobScheduler>,
}

impl BackgroundScheduler {
    pub async fn new(
        db_pool: DatabasePool,
        config: Arc<Config>,
        channel: Arc<dyn MessageChannel>,
    ) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;

        let window_hours = config.reminder_window_hours;
        scheduler
            .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
                let db_pool = db_pool.clone();
                let channel = channel.clone();
                Box::pin(async move {
                    match send_upcoming_reminders(&db_pool, &channel, window_hours).await {
                        Ok(summary) => info!(
                            "Reminder job finished: {} delivered, {} skipped, {} failed",
                            summary.delivered, summary.skipped, summary.failed
                        ),
                        Err(e) => tracing::error!("Reminder job failed: {}", e),
                    }
                })
            })?)
            .await?;

        scheduler.start().await?;
        info!("Background scheduler started");

        Ok(Self {
            scheduler: Arc::new(scheduler),
        })
    }

    pub async fn shutdown(&self) {
        // JobScheduler shuts down when dropped.
        info!("Background scheduler stopped");
    }
}

/// Dispatch `upcoming` reminders for every event starting within the
/// look-ahead window, to the users who favorited it.
pub async fn send_upcoming_reminders(
    pool: &DatabasePool,
    channel: &Arc<dyn MessageChannel>,
    window_hours: i32,
) -> Result<DispatchSummary, ApiError> {
    let rows = sqlx::query(
        r#"
        SELECT e.id, e.title,
               ST_X(e.location::geometry) AS longitude,
               ST_Y(e.location::geometry) AS latitude,
               e.start_date, e.end_date, e.price, e.created_by,
               COALESCE((SELECT array_agg(ec.category_id) FROM event_categories ec
                   WHERE ec.event_id = e.id), '{}') AS category_ids
        FROM events e
        WHERE e.start_date > NOW()
          AND e.start_date <= NOW() + make_interval(hours => $1)
        ORDER BY e.start_date
        "#,
    )
    .bind(window_hours)
    .fetch_all(&**pool)
    .await?;

    let matcher = PreferenceMatcher::new(pool.clone());
    let dispatcher = NotificationDispatcher::new(pool.clone(), channel.clone());
    let mut total = DispatchSummary::default();

    for row in rows {
        let snapshot = EventSnapshot {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            location: GeoPoint::new(row.try_get("longitude")?, row.try_get("latitude")?),
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            price: row.try_get("price")?,
            created_by: row.try_get("created_by")?,
            category_ids: row.try_get("category_ids")?,
        };

        let favoriters = matcher.users_to_remind(snapshot.id).await?;
        if favoriters.is_empty() {
            continue;
        }

        let summary = dispatcher
            .dispatch_as(&favoriters, NotificationType::Upcoming, None, &snapshot)
            .await;
        total.merge(summary);
    }

    Ok(total)
}
