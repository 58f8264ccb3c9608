//! Sketch-search and iterative-decomposition core for MinHash-based genomic
//! similarity.
//!
//! Given a query sketch and one or more databases of reference sketches
//! (flat collections or indexed trees), this crate answers two questions:
//!
//! - **search**: which references exceed a similarity/containment threshold
//!   against the query? ([`search_databases`])
//! - **gather**: what is the smallest ordered set of references that
//!   greedily covers the query's content? ([`gather_databases`])
//!
//! Signature file parsing, CLI argument handling, and the sketch-index tree
//! implementation itself are out of scope — callers bring their own
//! [`SketchIndex`] and populate [`Database`]/[`NamedSketch`] values.

pub mod database;
pub mod error;
pub mod format;
pub mod gather;
pub mod minhash;
pub mod scoring;
pub mod search;

pub use database::{Database, DatabaseSource, NamedSketch, SketchIndex};
pub use error::{CoreError, SketchError};
pub use format::format_bp;
pub use gather::{gather_databases, Gather, GatherResult, GatherStep};
pub use minhash::{max_hash_for_scaled, HashFunction, MinHash, MinHashBuilder, MAX_HASH};
pub use scoring::{FindBestState, Scoring};
pub use search::{search_databases, SearchResult};
