/// Pluggable scoring strategies.
///
/// `Scoring` is an enum of strategies rather than a generic callable: a
/// tagged variant over a common `score`/`should_prune` capability, handed to
/// both the flat and tree branches of database traversal.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::SketchError;
use crate::minhash::MinHash;

/// Tracks the best score observed during a single tree traversal, for the
/// FindBest family of strategies. Must be instantiated fresh per database —
/// reusing one across databases would prune correct matches in the second
/// database based on the best score of the first.
#[derive(Debug)]
pub struct FindBestState {
    best_score: AtomicU64,
}

impl FindBestState {
    pub fn new() -> Self {
        FindBestState {
            best_score: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Records `score` as the new best if it is >= the current best.
    /// Returns whether the candidate should be kept (true) or pruned (false).
    fn observe(&self, score: f64) -> bool {
        let mut current = f64::from_bits(self.best_score.load(Ordering::SeqCst));
        loop {
            if score < current {
                return false;
            }
            match self.best_score.compare_exchange_weak(
                current.to_bits(),
                score.to_bits(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(prev) => {
                    current = f64::from_bits(prev);
                    if score < current {
                        return false;
                    }
                }
            }
        }
    }
}

impl Default for FindBestState {
    fn default() -> Self {
        Self::new()
    }
}

/// One of the four scoring strategies.
pub enum Scoring<'a> {
    /// Jaccard with downsampling (search, similarity mode).
    Similarity,
    /// `contained_by` with downsampling (search, containment mode).
    Containment,
    /// Stateful: prunes any candidate scoring below the best seen so far
    /// during this traversal, using ordinary similarity.
    FindBest(&'a FindBestState),
    /// Like `FindBest`, but scores with `similarity_ignore_maxhash` (gather,
    /// where the query's upper bound has been lifted).
    FindBestIgnoreMaxHash(&'a FindBestState),
}

impl<'a> Scoring<'a> {
    /// Score a candidate against the query. Sketch-incompatibility (mismatched
    /// k-size/moltype/seed, or a resolution mismatch without downsampling)
    /// propagates as a fatal error rather than silently skipping.
    pub fn score(&self, query: &MinHash, candidate: &MinHash) -> Result<f64, SketchError> {
        match self {
            Scoring::Similarity | Scoring::FindBest(_) => query.similarity(candidate, true),
            Scoring::Containment => query.contained_by(candidate, true),
            Scoring::FindBestIgnoreMaxHash(_) => Ok(query.similarity_ignore_maxhash(candidate)),
        }
    }

    /// Whether a candidate with the given score should be excluded from this
    /// traversal. Only the FindBest family prunes; similarity/containment
    /// defer entirely to the threshold comparison at the call site.
    pub fn should_prune(&self, score: f64) -> bool {
        match self {
            Scoring::FindBest(state) | Scoring::FindBestIgnoreMaxHash(state) => {
                !state.observe(score)
            }
            Scoring::Similarity | Scoring::Containment => false,
        }
    }
}
