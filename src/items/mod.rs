//! Item records: opaque per-user payloads with a single current owner.

pub mod store;

pub use store::{Item, ItemStore};
