pub mod event_bus;
pub mod event_types;

pub use event_bus::{EventBus, DEFAULT_HISTORY_LIMIT};
pub use event_types::{
    topics, EmitOptions, EventBusStats, EventPriority, EventRecord, GlobalListener, Listener,
    ListenerOptions,
};
