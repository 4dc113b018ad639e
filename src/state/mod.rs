pub mod adapter;
pub mod path;
pub mod schema;
pub mod store;
pub mod types;

pub use adapter::StateAdapter;
pub use schema::{default_state, paths};
pub use store::StateStore;
pub use types::{StateCallback, StatePath, StateSnapshot, StoreStats};
