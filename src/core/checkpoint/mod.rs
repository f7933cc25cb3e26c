pub mod durable;
pub mod store;

pub use durable::{write_atomic, write_json_atomic};
pub use store::{CheckpointStore, Progress};
