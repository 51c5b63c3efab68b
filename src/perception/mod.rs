pub mod annotator;
pub mod indexer;
pub mod pipeline;
pub mod types;
