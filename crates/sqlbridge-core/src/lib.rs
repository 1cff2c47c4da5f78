//! Core types for sqlbridge.
//!
//! This crate provides the substrate the query-composition engine builds on:
//!
//! - `EntityType` / `Property` descriptors consumed from the metadata layer
//! - `SqlType` scalar types and opaque `TypeMapping` handles
//! - `Value` dynamic literals carried by constant nodes
//! - the `Error` taxonomy for translation failures

pub mod entity;
pub mod error;
pub mod types;
pub mod value;

pub use entity::{EntityType, Property};
pub use error::{Error, InternalError, InternalErrorKind, Result, TranslationError, TranslationErrorKind};
pub use types::{SqlType, TypeMapping};
pub use value::Value;
