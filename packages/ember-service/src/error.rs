use ember_privacy::Decision;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Backend(#[from] ember_backends::Error),
	#[error(transparent)]
	Embedding(#[from] ember_providers::Error),
	#[error(transparent)]
	Privacy(#[from] ember_privacy::Error),
	#[error("Content rejected by the privacy gate: {decision:?}")]
	SanitizationRejected { decision: Decision },
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
}
