//! Core abstractions for the braid orchestration layer.
//!
//! Message, tool and request types shared with every provider, the
//! [`Model`](model::Model) trait, the error taxonomy and output schemas.

pub use error::{Error, Result};
pub use schema::{Field, FieldError, FieldKind, OutputSchema, Shape};

mod error;
pub mod model;
pub mod schema;
#[cfg(feature = "testing")]
pub mod testing;
