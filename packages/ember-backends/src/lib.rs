pub mod chain;
pub mod cloud;
pub mod graph;
pub mod local;
pub mod models;
pub mod qdrant;
pub mod resilience;

mod error;

pub use error::{Error, Result};
pub use models::{ScoredDocument, SearchSpec};

use std::{future::Future, pin::Pin};

use ember_domain::MemoryDocument;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One persistence/search technology. Implemented once per backend; the
/// chain arranges adapters in preference order and applies first-success.
pub trait BackendAdapter
where
	Self: Send + Sync,
{
	fn name(&self) -> &'static str;

	fn store<'a>(&'a self, doc: &'a MemoryDocument) -> BoxFuture<'a, Result<()>>;

	fn search<'a>(&'a self, spec: &'a SearchSpec) -> BoxFuture<'a, Result<Vec<ScoredDocument>>>;
}
