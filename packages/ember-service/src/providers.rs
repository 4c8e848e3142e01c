//! Embedding provider seams. The service depends on these traits so tests
//! can swap in a deterministic embedder; the HTTP implementations defer to
//! `ember-providers`.

use ember_providers::resize;

use crate::BoxFuture;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, ember_providers::Result<Vec<Vec<f32>>>>;

	fn dimensions(&self) -> usize;
}

pub trait ImageEmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed_image<'a>(
		&'a self,
		image_b64: &'a str,
	) -> BoxFuture<'a, ember_providers::Result<Vec<f32>>>;
}

pub struct HttpEmbeddingProvider {
	cfg: ember_config::EmbeddingProviderConfig,
}

impl HttpEmbeddingProvider {
	pub fn new(cfg: ember_config::EmbeddingProviderConfig) -> Self {
		Self { cfg }
	}
}

impl EmbeddingProvider for HttpEmbeddingProvider {
	fn embed<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, ember_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(ember_providers::embedding::embed(&self.cfg, texts))
	}

	fn dimensions(&self) -> usize {
		self.cfg.dimensions as usize
	}
}

/// Image embedder whose foreign-dimension output is resized to the canonical
/// text-embedding dimension, so every backend indexes one vector size.
pub struct HttpImageEmbeddingProvider {
	cfg: ember_config::EmbeddingProviderConfig,
	canonical_dim: usize,
}

impl HttpImageEmbeddingProvider {
	pub fn new(cfg: ember_config::EmbeddingProviderConfig, canonical_dim: usize) -> Self {
		Self { cfg, canonical_dim }
	}
}

impl ImageEmbeddingProvider for HttpImageEmbeddingProvider {
	fn embed_image<'a>(
		&'a self,
		image_b64: &'a str,
	) -> BoxFuture<'a, ember_providers::Result<Vec<f32>>> {
		Box::pin(async move {
			let vec = ember_providers::embedding::embed_image(&self.cfg, image_b64).await?;

			Ok(resize(vec, self.canonical_dim))
		})
	}
}

/// The pair of embedders the service composes at startup. Text and code
/// share one embedder; images use the other.
pub struct Providers {
	pub text: Box<dyn EmbeddingProvider>,
	pub image: Box<dyn ImageEmbeddingProvider>,
}

impl Providers {
	pub fn from_config(cfg: &ember_config::Config) -> Self {
		let canonical_dim = cfg.providers.embedding.dimensions as usize;

		Self {
			text: Box::new(HttpEmbeddingProvider::new(cfg.providers.embedding.clone())),
			image: Box::new(HttpImageEmbeddingProvider::new(
				cfg.providers.image_embedding.clone(),
				canonical_dim,
			)),
		}
	}
}
