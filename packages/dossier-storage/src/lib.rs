//! In-memory knowledge-base engine.
//!
//! Each knowledge base holds documents split into ordered chunks. Similarity is a term-frequency
//! cosine over normalized, stop-word-free tokens, which stands in for a vector index.

pub mod corpus;
pub mod engine;
pub mod models;
pub mod segments;
pub mod similarity;

mod error;

pub use engine::{MemoryEngine, MemoryKnowledgeBase};
pub use error::{Error, Result};
