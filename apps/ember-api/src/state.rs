use std::sync::Arc;

use ember_service::MemoryService;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<MemoryService>,
}

impl AppState {
	pub async fn new(config: ember_config::Config) -> color_eyre::Result<Self> {
		let service = MemoryService::connect(config).await?;

		Ok(Self { service: Arc::new(service) })
	}
}
