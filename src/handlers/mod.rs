pub mod auth;
pub mod events;
pub mod preferences;
pub mod users;

pub use auth::{login, register, AuthResponse, LoginRequest, RegisterRequest};
pub use events::{
    create_event, delete_event, favorite_event, get_event, search_events, unfavorite_event,
    update_event, CreateEventRequest, EventMutationResponse, SearchResponse, UpdateEventRequest,
};
pub use preferences::{get_preferences, update_preferences, UpdatePreferencesRequest};
pub use users::{get_notifications, update_location, UpdateLocationRequest};
