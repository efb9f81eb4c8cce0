pub mod events;

pub use events::{Notification, NotificationEvent, NotificationPayload, Recipient};
