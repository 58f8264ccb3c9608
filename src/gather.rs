/// Gather engine: iterative subtractive decomposition with per-step
/// resolution reconciliation.
///
/// Structured as an explicit iterator type carrying the mutable iteration
/// state between calls, rather than a generator.
use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::database::{Database, NamedSketch};
use crate::error::CoreError;
use crate::format::format_bp;
use crate::minhash::{max_hash_for_scaled, intersection_size, sorted_difference, sorted_intersection, MinHash};
use crate::scoring::{FindBestState, Scoring};

/// A single reported gather result: the reference that was subtracted this
/// round, plus the coverage and uniqueness fractions it accounted for.
#[derive(Debug, Clone)]
pub struct GatherResult {
    pub intersect_bp: u64,
    pub f_orig_query: f64,
    pub f_match: f64,
    pub f_unique_to_query: f64,
    pub f_unique_weighted: f64,
    pub average_abund: f64,
    pub filename: String,
    pub name: String,
    pub md5: String,
    pub leaf: Arc<NamedSketch>,
}

/// One yielded gather iteration: the reportable result plus the auxiliary
/// values a caller needs to track overall progress (weight still unmatched,
/// the resolution this step reconciled to, and the residual query after
/// subtraction).
#[derive(Debug, Clone)]
pub struct GatherStep {
    pub result: GatherResult,
    pub weighted_missed: f64,
    pub new_max_hash: u64,
    pub residual_query: MinHash,
}

/// Lazy gather sequence: the consumer drives iteration via `next()`, and
/// all mutable state lives here between calls.
pub struct Gather<'a> {
    databases: &'a [Database],
    orig_query_size: usize,
    orig_mins: Vec<u64>,
    orig_abunds: HashMap<u64, u64>,
    sum_abunds: f64,
    r_metagenome: u64,
    residual_query: MinHash,
    threshold_bp: u64,
    done: bool,
}

impl<'a> Gather<'a> {
    /// Pre-processing: capture `orig_query`/`orig_mins`, build the
    /// abundance map, and construct the unbounded `residual_query` the
    /// iterations below will shrink.
    pub fn new(
        query: &MinHash,
        databases: &'a [Database],
        threshold_bp: u64,
        ignore_abundance: bool,
    ) -> Self {
        let orig_mins = query.get_hashes();

        let orig_abunds: HashMap<u64, u64> = if query.track_abundance() && !ignore_abundance {
            query.get_mins_with_abundance().into_iter().collect()
        } else {
            if query.track_abundance() && ignore_abundance {
                log::info!("** ignoring abundance");
            }
            orig_mins.iter().map(|h| (*h, 1u64)).collect()
        };
        let sum_abunds: f64 = orig_abunds.values().sum::<u64>() as f64;

        let r_metagenome = query.scaled();

        // Construct a residual query with the max_hash bound removed,
        // hashes preserved.
        let mut residual_query = query.copy_and_clear_unbounded();
        residual_query.add_many(&orig_mins);

        Gather {
            databases,
            orig_query_size: query.size(),
            orig_mins,
            orig_abunds,
            sum_abunds,
            r_metagenome,
            residual_query,
            threshold_bp,
            done: false,
        }
    }

    /// Find the best match across all databases using
    /// FindBestIgnoreMaxHash, tie-breaking on ascending md5sum for
    /// determinism.
    ///
    /// Databases are traversed in parallel; the tie-break itself is a final
    /// serial reduction so the result is independent of how the parallel
    /// traversal interleaves.
    fn find_best(&self) -> Result<Option<(f64, Arc<NamedSketch>, String)>, CoreError> {
        let per_db: Vec<Vec<(f64, Arc<NamedSketch>, String)>> = self
            .databases
            .par_iter()
            .map(|db| -> Result<Vec<(f64, Arc<NamedSketch>, String)>, CoreError> {
                let state = FindBestState::new();
                let scoring = Scoring::FindBestIgnoreMaxHash(&state);
                let candidates = db.visit(&scoring, &self.residual_query, 0.0)?;
                Ok(candidates
                    .into_iter()
                    .filter_map(|candidate| {
                        let score = self
                            .residual_query
                            .similarity_ignore_maxhash(&candidate.minhash);
                        (score > 0.0).then(|| (score, candidate, db.filename.clone()))
                    })
                    .collect())
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        let mut collected: Vec<_> = per_db.into_iter().flatten().collect();
        if collected.is_empty() {
            return Ok(None);
        }

        collected.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap()
                .then_with(|| a.1.md5sum().cmp(&b.1.md5sum()))
        });
        Ok(Some(collected.into_iter().next().unwrap()))
    }
}

impl<'a> Iterator for Gather<'a> {
    type Item = Result<GatherStep, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let (best_score, best_sketch, filename) = match self.find_best() {
            Ok(Some(found)) => found,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        debug_assert!(best_score > 0.0);

        // Step 2: the matched sketch must carry a scaled resolution.
        if best_sketch.minhash.max_hash() == 0 {
            self.done = true;
            log::error!("Best hash match in gather has no max_hash");
            log::error!("Please prepare database of sequences with a scaled value");
            return Some(Err(CoreError::NotScaled));
        }

        // Step 3: resolution reconciliation.
        let r_genome = best_sketch.minhash.scaled();
        let r_comparison = self.r_metagenome.max(r_genome);
        let new_max_hash = max_hash_for_scaled(r_comparison);

        let residual_mins_full = self.residual_query.get_hashes();
        let matched_mins_full = best_sketch.minhash.get_hashes();

        let residual_mins: Vec<u64> = residual_mins_full
            .iter()
            .copied()
            .filter(|h| *h < new_max_hash)
            .collect();
        let matched_mins: Vec<u64> = matched_mins_full
            .iter()
            .copied()
            .filter(|h| *h < new_max_hash)
            .collect();
        let orig_mins: Vec<u64> = self
            .orig_mins
            .iter()
            .copied()
            .filter(|h| *h < new_max_hash)
            .collect();

        // Step 4: intersections.
        let intersect_mins = sorted_intersection(&residual_mins, &matched_mins);
        let intersect_orig_count = intersection_size(&orig_mins, &matched_mins);
        let intersect_bp = r_comparison * intersect_orig_count as u64;

        // Step 5: termination on coverage floor, before yielding.
        if intersect_bp < self.threshold_bp {
            log::info!(
                "found less than {} in common. => exiting",
                format_bp(intersect_bp as f64)
            );
            self.done = true;
            return None;
        }

        // Step 6: fractional metrics.
        let f_match = intersect_mins.len() as f64 / matched_mins.len() as f64;
        let f_orig_query = intersect_orig_count as f64 / orig_mins.len() as f64;
        let f_unique_to_query = intersect_mins.len() as f64 / self.orig_query_size as f64;

        let weight_of = |h: &u64| -> f64 { *self.orig_abunds.get(h).unwrap_or(&1) as f64 };
        let intersect_weight: f64 = intersect_mins.iter().map(weight_of).sum();
        let f_unique_weighted = intersect_weight / self.sum_abunds;
        let average_abund = intersect_weight / intersect_mins.len() as f64;

        let result = GatherResult {
            intersect_bp,
            f_orig_query,
            f_match,
            f_unique_to_query,
            f_unique_weighted,
            average_abund,
            filename,
            name: best_sketch.name.clone(),
            md5: best_sketch.md5sum(),
            leaf: best_sketch.clone(),
        };

        // Step 8: subtract the full (unfiltered) matched hashes from the
        // full (unfiltered) residual — the per-step max_hash filtering
        // above only scopes this iteration's reported fractions, it does
        // not permanently truncate the persistent residual query (the
        // resolution each later match brings may be finer than this one's,
        // so hashes filtered out here may still matter next iteration).
        let new_residual_full = sorted_difference(&residual_mins_full, &matched_mins_full);

        let weighted_missed: f64 =
            new_residual_full.iter().map(weight_of).sum::<f64>() / self.sum_abunds;

        let mut new_residual_query = self.residual_query.copy_and_clear();
        new_residual_query.add_many(&new_residual_full);
        self.residual_query = new_residual_query.clone();

        Some(Ok(GatherStep {
            result,
            weighted_missed,
            new_max_hash,
            residual_query: new_residual_query,
        }))
    }
}

/// Convenience wrapper: build a `Gather` iterator over `databases`, greedily
/// decomposing `query` until coverage per step drops below `threshold_bp`.
pub fn gather_databases<'a>(
    query: &MinHash,
    databases: &'a [Database],
    threshold_bp: u64,
    ignore_abundance: bool,
) -> Gather<'a> {
    Gather::new(query, databases, threshold_bp, ignore_abundance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn sketch(name: &str, hashes: &[u64], scaled: u64) -> Arc<NamedSketch> {
        let mut mh = MinHash::builder().ksize(31).scaled(scaled).build();
        mh.add_many(hashes);
        Arc::new(NamedSketch::new(name, mh))
    }

    fn query_mh(hashes: &[u64], scaled: u64) -> MinHash {
        let mut mh = MinHash::builder().ksize(31).scaled(scaled).build();
        mh.add_many(hashes);
        mh
    }

    /// S1: q={1,2,3,4,5}, r={3,4,5,6,7}, both scaled=1000.
    #[test]
    fn scenario_s1_partial_match_then_terminate() {
        let query = query_mh(&[1, 2, 3, 4, 5], 1000);
        let databases = vec![Database::flat("r.sig", vec![sketch("r", &[3, 4, 5, 6, 7], 1000)])];

        let mut steps: Vec<GatherStep> = gather_databases(&query, &databases, 0, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(steps.len(), 1);
        let step = steps.remove(0);
        assert_eq!(step.result.f_match, 3.0 / 5.0);
        assert_eq!(step.result.f_orig_query, 3.0 / 5.0);
        assert_eq!(step.result.f_unique_to_query, 3.0 / 5.0);
        assert_eq!(step.result.intersect_bp, 3000);
    }

    /// S2: abundance-weighted metrics.
    #[test]
    fn scenario_s2_weighted_metrics() {
        let mut query = MinHash::builder()
            .ksize(31)
            .scaled(1000)
            .track_abundance(true)
            .build();
        for (h, count) in [(1, 10), (2, 10), (3, 1), (4, 1), (5, 1)] {
            for _ in 0..count {
                query.add_hash(h);
            }
        }
        let databases = vec![Database::flat("r.sig", vec![sketch("r", &[3, 4, 5], 1000)])];

        let steps: Vec<GatherStep> = gather_databases(&query, &databases, 0, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(steps.len(), 1);
        let step = &steps[0];
        assert_eq!(step.result.f_unique_weighted, 3.0 / 23.0);
        assert_eq!(step.result.average_abund, 1.0);
    }

    /// S3: resolution mismatch reconciles to the coarser scaled value.
    #[test]
    fn scenario_s3_resolution_reconciliation() {
        let query = query_mh(&[1, 2, 3, 4, 5], 1000);
        let databases = vec![Database::flat(
            "r.sig",
            vec![sketch("r", &[3, 4, 5, 6, 7], 2000)],
        )];
        let steps: Vec<GatherStep> = gather_databases(&query, &databases, 0, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].new_max_hash, max_hash_for_scaled(2000));
    }

    /// S4: below the coverage floor terminates without yielding.
    #[test]
    fn scenario_s4_coverage_floor_terminates() {
        let query = query_mh(&[1, 2, 3, 4, 5], 1000);
        let databases = vec![Database::flat("r.sig", vec![sketch("r", &[3, 4, 5, 6, 7], 1000)])];
        let steps: Vec<GatherStep> = gather_databases(&query, &databases, 10_000, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert!(steps.is_empty());
    }

    /// S6: ties broken by ascending md5sum.
    #[test]
    fn scenario_s6_tie_break_on_md5() {
        let query = query_mh(&[1, 2, 3], 1000);
        let a = sketch("a", &[1, 2, 3], 1000);
        let b = sketch("b", &[1, 2, 3], 1000);
        let (first, second) = if a.md5sum() < b.md5sum() {
            ("a", "b")
        } else {
            ("b", "a")
        };
        let databases = vec![Database::flat("r.sig", vec![a, b])];
        let steps: Vec<GatherStep> = gather_databases(&query, &databases, 0, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(steps[0].result.name, first);
        assert_ne!(steps[0].result.name, second);
    }

    #[test]
    fn property_no_matches_yields_nothing() {
        let query = query_mh(&[1, 2, 3], 1000);
        let databases = vec![Database::flat("r.sig", vec![sketch("far", &[100, 101], 1000)])];
        let steps: Vec<GatherStep> = gather_databases(&query, &databases, 0, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert!(steps.is_empty());
    }

    #[test]
    fn property_self_match_covers_query_fully() {
        let query = query_mh(&[1, 2, 3, 4, 5], 1000);
        let databases = vec![Database::flat(
            "r.sig",
            vec![sketch("self", &[1, 2, 3, 4, 5], 1000)],
        )];
        let steps: Vec<GatherStep> = gather_databases(&query, &databases, 0, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].result.f_orig_query, 1.0);
        assert_eq!(steps[0].result.f_match, 1.0);
    }

    #[test]
    fn residual_shrinks_monotonically_across_iterations() {
        let query = query_mh(&[1, 2, 3, 4, 5, 6], 1000);
        let databases = vec![Database::flat(
            "r.sig",
            vec![
                sketch("first", &[1, 2], 1000),
                sketch("second", &[3, 4], 1000),
            ],
        )];
        let steps: Vec<GatherStep> = gather_databases(&query, &databases, 0, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps[0].residual_query.size() > steps[1].residual_query.size());
    }

    #[test]
    fn missing_max_hash_on_match_is_fatal() {
        let query = query_mh(&[1, 2, 3], 1000);
        let mut unscaled = MinHash::builder().ksize(31).build();
        unscaled.add_many(&[1, 2, 3]);
        let databases = vec![Database::flat(
            "r.sig",
            vec![Arc::new(NamedSketch::new("r", unscaled))],
        )];
        let mut gather = gather_databases(&query, &databases, 0, false);
        match gather.next() {
            Some(Err(CoreError::NotScaled)) => {}
            other => panic!("expected NotScaled error, got {:?}", other.is_some()),
        }
    }
}
