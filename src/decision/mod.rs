pub mod client;
pub mod parser;
pub mod prompt;
pub mod types;

pub use client::DecisionClient;
