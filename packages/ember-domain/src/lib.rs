pub mod document;
pub mod query;
pub mod scoring;

pub use document::{ContentType, DocumentMetadata, MemoryDocument};
pub use query::{QueryFilters, QueryType, RagQuery, TimeRange};
