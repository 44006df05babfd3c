pub mod knowledge_base;

pub use knowledge_base::{
    IngestOutcome, IngestProgress, IngestionReport, KnowledgeBase, KnowledgeSettings, Retrieval,
    SkipReason,
};
