//! JSON corpus files.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CorpusFile {
	#[serde(default)]
	pub knowledge_bases: Vec<KnowledgeBaseSource>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeBaseSource {
	pub id: String,
	pub title: String,
	#[serde(default)]
	pub description: String,
	#[serde(default = "default_language")]
	pub language: String,
	#[serde(default)]
	pub documents: Vec<DocumentSource>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentSource {
	pub id: String,
	pub title: String,
	#[serde(default)]
	pub metadata: Map<String, Value>,
	#[serde(default)]
	pub chunks: Vec<ChunkSource>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkSource {
	pub text: String,
	#[serde(default)]
	pub page_start: Option<u32>,
	#[serde(default)]
	pub page_end: Option<u32>,
	#[serde(default)]
	pub section_title: Option<String>,
}

pub fn read(path: &Path) -> Result<CorpusFile> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadCorpus { path: path.to_path_buf(), source: err })?;

	serde_json::from_str(&raw)
		.map_err(|err| Error::ParseCorpus { path: path.to_path_buf(), source: err })
}

fn default_language() -> String {
	"fr".to_string()
}
