//! Solution-Index: persistent semantic index over the remediation corpus
//!
//! ## Key Components
//!
//! - `SolutionRecord` / `Solution`: corpus entries before and after indexing
//! - `load_corpus`: validated corpus-file loading
//! - `Embedder`: embedding backend seam (`HashEmbedder`, `OllamaEmbedder`)
//! - `SolutionIndex`: exclusive `rebuild`, concurrent `query`
//! - `store`: digest-verified on-disk collections

pub mod corpus;
pub mod embedder;
mod error;
pub mod index;
pub mod record;
pub mod store;

pub use corpus::{load_corpus, parse_corpus};
pub use embedder::{cosine_similarity, Embedder, HashEmbedder, OllamaEmbedder};
pub use error::IndexError;
pub use index::{
    RebuildSummary, ScoredSolution, SolutionIndex, SolutionQuery, DEFAULT_COLLECTION,
};
pub use record::{solution_id, Category, EntryMetadata, RiskLevel, Solution, SolutionRecord};

/// Result type for solution-index operations
pub type Result<T> = std::result::Result<T, IndexError>;
