//! Resource processing pipeline.
//!
//! A [`Pipeline`] threads each FHIR resource through zero or more
//! [`Processor`]s, which may mutate, drop, batch or split it, and then writes
//! whatever comes out to zero or more [`Sink`]s:
//!
//! ```text
//! process() -> P1 -> P2 -> ... -> Pn -> [S1, S2, ...]
//! ```
//!
//! Resources travel as [`ResourceWrapper`]s which lazily convert between the
//! wire bytes and a parsed `serde_json::Value`.
//!
//! # Example
//!
//! ```ignore
//! use bulkfhir_core::processing::{Pipeline, ResourceTypeFilter, TracingSink};
//! use bulkfhir_core::bulkfhir::ResourceType;
//!
//! let pipeline = Pipeline::new(
//!     vec![Box::new(ResourceTypeFilter::new([ResourceType::Patient]))],
//!     vec![Box::new(TracingSink::new())],
//! );
//! pipeline.process(ResourceType::Patient, url, line.into_bytes()).await?;
//! pipeline.finalize().await?;
//! ```

mod error;
mod filter;
mod pipeline;
mod resource;
mod traits;
mod tracing_sink;

pub use error::ProcessingError;
pub use filter::ResourceTypeFilter;
pub use pipeline::Pipeline;
pub use resource::{JsonCodec, ResourceCodec, ResourceWrapper};
pub use traits::{Output, Processor, ProcessorBase, Sink};
pub use tracing_sink::TracingSink;
