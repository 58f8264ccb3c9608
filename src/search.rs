/// Search engine: runs a query against one or more databases and returns
/// every match at or above a threshold.
use std::collections::HashSet;
use std::sync::Arc;

use crate::database::{Database, NamedSketch};
use crate::error::SketchError;
use crate::minhash::MinHash;
use crate::scoring::{FindBestState, Scoring};

/// A single search hit: the matched sketch plus its reportable score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub similarity: f64,
    pub match_sketch: Arc<NamedSketch>,
    pub md5: String,
    pub filename: String,
    pub name: String,
}

/// Returns every match at or above `threshold` across all databases,
/// de-duplicated by content digest, sorted by descending similarity with
/// ties broken by discovery order (a stable sort).
pub fn search_databases(
    query: &MinHash,
    databases: &[Database],
    threshold: f64,
    do_containment: bool,
    best_only: bool,
) -> Result<Vec<SearchResult>, SketchError> {
    // The reportable score is always similarity or containment per
    // `do_containment`, independent of whichever strategy pruned the
    // traversal: the engine separately re-scores every returned leaf.
    let reportable = if do_containment {
        Scoring::Containment
    } else {
        Scoring::Similarity
    };

    let mut results = Vec::new();
    let mut found_md5: HashSet<String> = HashSet::new();

    for db in databases {
        // FindBest only replaces the traversal predicate for indexed
        // databases, and always uses similarity regardless of
        // `do_containment` — matching the upstream source's
        // `search_fn = SearchMinHashesFindBest().search` override, which
        // ignores the containment/similarity choice made a few lines above
        // it. Preserved here rather than "fixed", per this crate's policy of
        // keeping the source's documented behavior rather than "fixing" it.
        let find_best_state;
        let traversal = if best_only && db.is_indexed() {
            find_best_state = FindBestState::new();
            Scoring::FindBest(&find_best_state)
        } else if do_containment {
            Scoring::Containment
        } else {
            Scoring::Similarity
        };

        let candidates = db.visit(&traversal, query, threshold)?;

        for candidate in candidates {
            let similarity = reportable.score(query, &candidate.minhash)?;
            debug_assert!(
                similarity >= threshold,
                "tree search should always/only return matches above threshold"
            );
            if similarity < threshold {
                continue;
            }
            let md5 = candidate.md5sum();
            if found_md5.insert(md5.clone()) {
                results.push(SearchResult {
                    similarity,
                    name: candidate.name.clone(),
                    match_sketch: candidate,
                    md5,
                    filename: db.filename.clone(),
                });
            }
        }
    }

    // Stable sort: ties keep their discovery order (database enumeration
    // order, then in-database order).
    results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());

    Ok(results)
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

    #[test]
    fn results_are_above_threshold_deduped_and_sorted() {
        let query = query_mh(&[1, 2, 3, 4, 5], 1000);
        let databases = vec![Database::flat(
            "db.sig",
            vec![
                sketch("best", &[1, 2, 3, 4, 5], 1000),
                sketch("mid", &[1, 2, 3], 1000),
                sketch("low", &[1], 1000),
            ],
        )];

        let results = search_databases(&query, &databases, 0.1, false, false).unwrap();
        assert!(results.iter().all(|r| r.similarity >= 0.1));
        let mut md5s = HashSet::new();
        assert!(results.iter().all(|r| md5s.insert(r.md5.clone())));
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        assert_eq!(results[0].name, "best");
    }

    #[test]
    fn perfect_match_at_threshold_one_is_only_self() {
        let query = query_mh(&[1, 2, 3, 4, 5], 1000);
        let databases = vec![Database::flat(
            "db.sig",
            vec![
                sketch("self", &[1, 2, 3, 4, 5], 1000),
                sketch("near", &[1, 2, 3, 4], 1000),
            ],
        )];
        let results = search_databases(&query, &databases, 1.0, false, false).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "self");
        assert_eq!(results[0].similarity, 1.0);
    }

    #[test]
    fn containment_of_self_is_one() {
        let query = query_mh(&[1, 2, 3, 4, 5], 1000);
        let databases = vec![Database::flat(
            "db.sig",
            vec![sketch("self", &[1, 2, 3, 4, 5], 1000)],
        )];
        let results = search_databases(&query, &databases, 0.0, true, false).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].similarity, 1.0);
    }

    #[test]
    fn no_matches_above_threshold_is_empty() {
        let query = query_mh(&[1, 2, 3], 1000);
        let databases = vec![Database::flat("db.sig", vec![sketch("far", &[100, 101], 1000)])];
        let results = search_databases(&query, &databases, 0.5, false, false).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn incompatible_ksize_is_fatal() {
        let query = MinHash::builder().ksize(21).build();
        let databases = vec![Database::flat(
            "db.sig",
            vec![sketch("other_k", &[1, 2, 3], 1000)],
        )];
        assert!(search_databases(&query, &databases, 0.0, false, false).is_err());
    }
}
