//! # Notifications
//!
//! Connection registry, job subscriptions and realtime event fan-out.

pub mod events;
pub mod hub;
pub mod reaper;
pub mod transport;

pub use events::{EventType, NotificationEvent};
pub use hub::{Connection, HubStats, NotificationHub, PublishReport};
pub use reaper::spawn_idle_reaper;
pub use transport::{ChannelTransport, RealtimeTransport, TransportError};
