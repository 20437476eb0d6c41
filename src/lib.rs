pub mod artifact;
pub mod builder;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod hamming;
pub mod index;
pub mod metadata;
mod metrics;
pub mod ranker;
pub mod sampler;
pub mod utils;

pub use builder::{BuildSummary, CorpusBuilder, build_index};
pub use config::Opts;
pub use corpus::{LoadOptions, SearchOutcome, SearchableCorpus};
pub use engine::Engine;
pub use error::{Error, Result};
pub use ranker::{Ranker, SearchResult, Similarity};
