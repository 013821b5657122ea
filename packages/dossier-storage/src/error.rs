use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to read corpus file at {path:?}.")]
	ReadCorpus { path: PathBuf, source: std::io::Error },
	#[error("Failed to parse corpus file at {path:?}.")]
	ParseCorpus { path: PathBuf, source: serde_json::Error },
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Conflict: {0}")]
	Conflict(String),
}
