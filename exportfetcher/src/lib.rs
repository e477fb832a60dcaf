//! Turns vendor export files into graph events.
//!
//! Export rows arrive as CSV with a JSON payload column. [`transform`] maps
//! each payload into a flat record through a declarative [`FieldMap`], and a
//! [`GraphGenerator`] expands those records into node and relationship events
//! ready for `kgstore`'s loader.

pub mod confluence;
pub mod error;
pub mod generator;
pub mod jira;
pub mod mapper;
pub mod slack;
pub mod transform;

pub use crate::error::{FetcherError, Result};
pub use crate::generator::{EventStream, GenerateReport, GraphGenerator, SourceSystem};
pub use crate::mapper::{Accessor, FieldMap};
pub use crate::transform::{transform, TransformReport};
