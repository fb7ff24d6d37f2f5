// src/events/mod.rs

//! Named-event pub-sub shared by the rebuild loop and the notifier endpoints.

pub mod bus;

pub use bus::{Backpressure, Event, EventBus, EventBusConfig, Handler, Subscription};

/// Event emitted after every successful rebuild.
pub const RELOAD_EVENT: &str = "reload";

/// Payload written to clients for [`RELOAD_EVENT`].
pub const RELOAD_PAYLOAD: &str = "reload";

/// The bus type used by the server: payloads are the text sent to clients.
pub type ReloadBus = EventBus<String>;
