//! Subject module: what is being collected
//!
//! # Components
//!
//! - `EntityType`: the catalogue category (anime, book, music, game, real)
//! - `SubjectId`: the token naming one subject within a category
//! - `flatten`: turns a nested detail record into one `FlatRecord` table row

mod entity;
mod flatten;

// Re-export main types
pub use entity::{EntityType, SubjectId};
pub use flatten::{flatten, FlatRecord, FlattenError, REQUIRED_FIELDS};
