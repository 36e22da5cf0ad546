//! Domain model: entities, lifecycle rules and events.
pub mod aggregates;
pub mod events;
pub mod value_objects;
