//! Knowledge-base retrieval: JSONL corpus → TF–IDF vectors → cosine search,
//! plus the agent tools that expose it.

pub mod corpus;
pub mod engine;
pub mod error;
mod stopwords;
pub mod tfidf;
pub mod tools;

pub use {
    corpus::Document,
    engine::{KnowledgeBase, RetrievalSettings, ScoredDocument, TopicLookup},
    error::{Error, Result},
    tools::register_tools,
};
