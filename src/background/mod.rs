pub mod scheduler;

pub use scheduler::{send_upcoming_reminders, BackgroundScheduler};
