//! Preference-ordered backend chain. Writes and searches walk the adapters
//! in configured order and take the first success; later adapters only run
//! when an earlier one fails.

use std::sync::Arc;

use ember_domain::MemoryDocument;

use crate::{BackendAdapter, Error, Result, ScoredDocument, SearchSpec};

pub struct BackendChain {
	backends: Vec<Arc<dyn BackendAdapter>>,
}

impl BackendChain {
	pub fn new(backends: Vec<Arc<dyn BackendAdapter>>) -> Result<Self> {
		if backends.is_empty() {
			return Err(Error::InvalidArgument("backend chain must not be empty".to_string()));
		}

		Ok(Self { backends })
	}

	pub fn names(&self) -> Vec<&'static str> {
		self.backends.iter().map(|backend| backend.name()).collect()
	}

	/// Persist to the first backend that accepts the write; returns its name.
	pub async fn store(&self, doc: &MemoryDocument) -> Result<&'static str> {
		let mut last = None;

		for backend in &self.backends {
			match backend.store(doc).await {
				Ok(()) => {
					tracing::debug!(backend = backend.name(), id = %doc.id, "Stored document.");

					return Ok(backend.name());
				},
				Err(err) => {
					tracing::warn!(
						backend = backend.name(),
						error = %err,
						"Backend rejected store; falling through.",
					);

					last = Some(err);
				},
			}
		}

		Err(all_failed(last))
	}

	/// Search the first backend that answers; returns its name alongside the
	/// hits. An empty result set from a healthy backend is a success, not a
	/// reason to fall through.
	pub async fn search(
		&self,
		spec: &SearchSpec,
	) -> Result<(&'static str, Vec<ScoredDocument>)> {
		let mut last = None;

		for backend in &self.backends {
			match backend.search(spec).await {
				Ok(hits) => return Ok((backend.name(), hits)),
				Err(err) => {
					tracing::warn!(
						backend = backend.name(),
						error = %err,
						"Backend search failed; falling through.",
					);

					last = Some(err);
				},
			}
		}

		Err(all_failed(last))
	}
}

fn all_failed(last: Option<Error>) -> Error {
	Error::AllBackendsFailed {
		last: last.map(|err| err.to_string()).unwrap_or_else(|| "no backends".to_string()),
	}
}
