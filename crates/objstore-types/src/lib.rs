//! Foundation types for objstore.
//!
//! This crate provides the backend-neutral value types exchanged across the
//! object storage contract. Every other objstore crate depends on
//! `objstore-types`.
//!
//! # Key Types
//!
//! - [`ObjectAttributes`] -- Backend-native key/value metadata attached to an object
//! - [`ObjectMetadata`] -- Normalized size / modification time / attributes snapshot
//! - [`WriteMode`] -- How a write composes with an existing object
//! - [`ReadSettings`] / [`WriteSettings`] -- Strategy hints that never change content

pub mod error;
pub mod metadata;
pub mod mode;
pub mod settings;

pub use error::TypeError;
pub use metadata::{ObjectAttributes, ObjectMetadata};
pub use mode::WriteMode;
pub use settings::{Durability, ReadMethod, ReadSettings, WriteSettings, DEFAULT_BUFFER_SIZE};
