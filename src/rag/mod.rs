//! Document-grounded answer path: vector retrieval, citation building,
//! and the two-phase RAG pipeline (retrieval-only tool phase, then
//! generation).

pub mod citations;
pub mod pipeline;
mod retriever;

pub use retriever::{
    ChunkRetriever, FastembedEmbedder, QdrantRetriever, QueryEmbedder, RetrievedChunk,
};
