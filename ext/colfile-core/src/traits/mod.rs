//! Traits shared across the crate's public types

pub mod schema;

pub use schema::SchemaInspector;
