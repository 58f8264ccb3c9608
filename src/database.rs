/// Database iteration abstraction.
///
/// Mirrors the `(sbt_or_siglist, filename, is_sbt)` triple that
/// `search_databases`/`gather_databases` iterate over, generalized from a
/// hard-coded SBT/siglist pair into a `DatabaseSource` enum.
use std::sync::Arc;

use crate::error::SketchError;
use crate::minhash::MinHash;
use crate::scoring::Scoring;

/// A single reference sketch plus the identity fields search/gather need to
/// report it (name, content digest).
#[derive(Debug, Clone)]
pub struct NamedSketch {
    pub name: String,
    pub minhash: MinHash,
}

impl NamedSketch {
    pub fn new(name: impl Into<String>, minhash: MinHash) -> Self {
        NamedSketch {
            name: name.into(),
            minhash,
        }
    }

    pub fn md5sum(&self) -> String {
        self.minhash.md5sum()
    }
}

/// The callback contract an indexed sketch tree must honor during traversal.
/// The tree owns pruning; this crate only specifies the predicate it is
/// pruned with and trusts the invariant that every returned leaf scores at
/// or above `threshold`.
pub trait SketchIndex: Send + Sync {
    fn find(&self, scoring: &Scoring, query: &MinHash, threshold: f64) -> Vec<Arc<NamedSketch>>;
}

/// Either a flat collection of sketches or a traversable tree.
pub enum DatabaseSource {
    Flat(Vec<Arc<NamedSketch>>),
    Indexed(Arc<dyn SketchIndex>),
}

/// `(source, filename, is_indexed)` — `is_indexed` is implied by the
/// `DatabaseSource` variant rather than carried as a separate field.
pub struct Database {
    pub source: DatabaseSource,
    pub filename: String,
}

impl Database {
    pub fn flat(filename: impl Into<String>, sketches: Vec<Arc<NamedSketch>>) -> Self {
        Database {
            source: DatabaseSource::Flat(sketches),
            filename: filename.into(),
        }
    }

    pub fn indexed(filename: impl Into<String>, tree: Arc<dyn SketchIndex>) -> Self {
        Database {
            source: DatabaseSource::Indexed(tree),
            filename: filename.into(),
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.source, DatabaseSource::Indexed(_))
    }

    /// Uniform traversal primitive: candidates scoring at or above
    /// `threshold` under `scoring`.
    ///
    /// For an indexed source the tree is trusted to have already pruned to
    /// the threshold; we still re-score each returned leaf to assert that
    /// invariant holds.
    pub fn visit(
        &self,
        scoring: &Scoring,
        query: &MinHash,
        threshold: f64,
    ) -> Result<Vec<Arc<NamedSketch>>, SketchError> {
        match &self.source {
            DatabaseSource::Indexed(tree) => {
                let leaves = tree.find(scoring, query, threshold);
                for leaf in &leaves {
                    let score = scoring.score(query, &leaf.minhash)?;
                    debug_assert!(
                        score >= threshold,
                        "indexed tree '{}' returned a leaf below threshold: {} < {}",
                        self.filename,
                        score,
                        threshold
                    );
                }
                Ok(leaves)
            }
            DatabaseSource::Flat(sketches) => {
                let mut matches = Vec::new();
                for sketch in sketches {
                    let score = scoring.score(query, &sketch.minhash)?;
                    if score >= threshold {
                        matches.push(sketch.clone());
                    }
                }
                Ok(matches)
            }
        }
    }
}
