pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Completion timed out after {timeout_ms} ms.")]
	Timeout { timeout_ms: u64 },
}
impl From<dossier_providers::Error> for Error {
	fn from(err: dossier_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<dossier_storage::Error> for Error {
	fn from(err: dossier_storage::Error) -> Self {
		match err {
			dossier_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
