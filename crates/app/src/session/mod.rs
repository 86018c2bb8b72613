//! Session wiring: the inbound event queue, the observer bus, and the
//! manager that owns per-session lifecycles.

pub mod events;
pub mod manager;

pub use events::{spawn_forwarder, EventPublisher, PublishedEvent, SessionEvent};
pub use manager::{SessionHandle, SessionManager};
