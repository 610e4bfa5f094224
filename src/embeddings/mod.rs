pub mod chunking;
pub mod huggingface;

pub use chunking::{Chunk, ChunkingConfig};
pub use huggingface::EmbeddingClient;
