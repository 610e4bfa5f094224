pub mod commands;
pub mod config;
pub mod embeddings;
pub mod ingest;
pub mod llm;
pub mod prompt;
pub mod retriever;
pub mod server;
pub mod store;
