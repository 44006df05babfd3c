pub mod database;
pub mod memory_index;
pub mod qdrant_config;
pub mod traits;
pub mod vector_db;

pub use database::{Database, DatabaseError, ManifestEntry};
pub use memory_index::InMemoryIndex;
pub use traits::{IndexEntry, ScoredPassage, VectorDBError, VectorIndex};
pub use vector_db::VectorDB;
