/// MinHash sketch primitive.
///
/// Everything downstream (scoring, database traversal, search, gather) is
/// written against this type's public contract, not its storage details.
use std::collections::HashMap;

use crate::error::SketchError;

/// The largest representable hash value plus one, in this crate's 64-bit
/// hash domain. `scaled` and `max_hash` are two views of the same quantity:
/// `max_hash = MAX_HASH / scaled`.
pub const MAX_HASH: u64 = u64::MAX;

/// `max_hash` a sketch must enforce to retain hashes at resolution `scaled`.
pub fn max_hash_for_scaled(scaled: u64) -> u64 {
    MAX_HASH / scaled
}

/// `scaled` implied by a given `max_hash` bound. Inverse of `max_hash_for_scaled`,
/// subject to integer-division rounding at extreme values.
pub fn scaled_for_max_hash(max_hash: u64) -> u64 {
    if max_hash == 0 {
        1
    } else {
        MAX_HASH / max_hash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFunction {
    Murmur64Dna,
    Murmur64Protein,
    Murmur64Dayhoff,
    Murmur64Hp,
}

/// A bounded multiset of hashes with associated metadata.
///
/// `mins` is kept sorted and deduplicated so similarity/containment/
/// intersection can all run as a linear merge over the smaller side.
#[derive(Debug, Clone)]
pub struct MinHash {
    mins: Vec<u64>,
    abunds: Option<HashMap<u64, u64>>,
    ksize: u32,
    hash_function: HashFunction,
    seed: u64,
    /// 0 means unbounded (no max_hash set).
    max_hash: u64,
    track_abundance: bool,
}

#[derive(Debug, Clone)]
pub struct MinHashBuilder {
    ksize: u32,
    hash_function: HashFunction,
    seed: u64,
    max_hash: u64,
    track_abundance: bool,
}

impl Default for MinHashBuilder {
    fn default() -> Self {
        MinHashBuilder {
            ksize: 31,
            hash_function: HashFunction::Murmur64Dna,
            seed: 42,
            max_hash: 0,
            track_abundance: false,
        }
    }
}

impl MinHashBuilder {
    pub fn ksize(mut self, ksize: u32) -> Self {
        self.ksize = ksize;
        self
    }

    pub fn hash_function(mut self, hash_function: HashFunction) -> Self {
        self.hash_function = hash_function;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_hash(mut self, max_hash: u64) -> Self {
        self.max_hash = max_hash;
        self
    }

    pub fn scaled(mut self, scaled: u64) -> Self {
        self.max_hash = max_hash_for_scaled(scaled);
        self
    }

    pub fn track_abundance(mut self, track_abundance: bool) -> Self {
        self.track_abundance = track_abundance;
        self
    }

    pub fn build(self) -> MinHash {
        MinHash {
            mins: Vec::new(),
            abunds: self.track_abundance.then(HashMap::new),
            ksize: self.ksize,
            hash_function: self.hash_function,
            seed: self.seed,
            max_hash: self.max_hash,
            track_abundance: self.track_abundance,
        }
    }
}

impl MinHash {
    pub fn builder() -> MinHashBuilder {
        MinHashBuilder::default()
    }

    pub fn ksize(&self) -> u32 {
        self.ksize
    }

    pub fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 0 means unbounded.
    pub fn max_hash(&self) -> u64 {
        self.max_hash
    }

    pub fn scaled(&self) -> u64 {
        scaled_for_max_hash(self.max_hash)
    }

    pub fn track_abundance(&self) -> bool {
        self.track_abundance
    }

    pub fn size(&self) -> usize {
        self.mins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mins.is_empty()
    }

    /// Insert a single hash, respecting `max_hash` if set.
    pub fn add_hash(&mut self, hash: u64) {
        if self.max_hash != 0 && hash >= self.max_hash {
            return;
        }
        match self.mins.binary_search(&hash) {
            Ok(_) => {}
            Err(pos) => self.mins.insert(pos, hash),
        }
        if let Some(abunds) = &mut self.abunds {
            *abunds.entry(hash).or_insert(0) += 1;
        }
    }

    /// Bulk insert.
    pub fn add_many(&mut self, hashes: &[u64]) {
        for hash in hashes {
            self.add_hash(*hash);
        }
    }

    /// Enumeration of contained hashes, sorted ascending.
    pub fn get_hashes(&self) -> Vec<u64> {
        self.mins.clone()
    }

    /// Enumeration with abundance. Hashes not tracked with an explicit
    /// count report abundance 1.
    pub fn get_mins_with_abundance(&self) -> Vec<(u64, u64)> {
        self.mins
            .iter()
            .map(|h| {
                let count = self
                    .abunds
                    .as_ref()
                    .and_then(|a| a.get(h))
                    .copied()
                    .unwrap_or(1);
                (*h, count)
            })
            .collect()
    }

    /// New sketch with the same metadata, empty hash set.
    pub fn copy_and_clear(&self) -> MinHash {
        MinHash {
            mins: Vec::new(),
            abunds: self.track_abundance.then(HashMap::new),
            ksize: self.ksize,
            hash_function: self.hash_function,
            seed: self.seed,
            max_hash: self.max_hash,
            track_abundance: self.track_abundance,
        }
    }

    /// Same metadata, `max_hash` lifted (set to unbounded). Used by gather
    /// to build the residual query it shrinks on every iteration.
    pub fn copy_and_clear_unbounded(&self) -> MinHash {
        MinHash {
            mins: Vec::new(),
            abunds: self.track_abundance.then(HashMap::new),
            ksize: self.ksize,
            hash_function: self.hash_function,
            seed: self.seed,
            max_hash: 0,
            track_abundance: self.track_abundance,
        }
    }

    fn check_compatible(&self, other: &MinHash) -> Result<(), SketchError> {
        if self.ksize != other.ksize {
            return Err(SketchError::MismatchKSizes);
        }
        if self.hash_function != other.hash_function {
            return Err(SketchError::MismatchDNAProt);
        }
        if self.seed != other.seed {
            return Err(SketchError::MismatchSeed);
        }
        Ok(())
    }

    /// The `max_hash` bound both sketches must downsample to for a
    /// resolution-reconciled comparison: the coarser (smaller, nonzero)
    /// of the two, or unbounded if both are unbounded.
    fn comparison_max_hash(&self, other: &MinHash, downsample: bool) -> Result<u64, SketchError> {
        match (self.max_hash, other.max_hash) {
            (0, 0) => Ok(0),
            (a, b) if a == b => Ok(a),
            _ if !downsample => Err(SketchError::MismatchScaled),
            (0, b) => Ok(b),
            (a, 0) => Ok(a),
            (a, b) => Ok(a.min(b)),
        }
    }

    fn comparable_mins(&self, other: &MinHash, downsample: bool) -> Result<(Vec<u64>, Vec<u64>), SketchError> {
        let target = self.comparison_max_hash(other, downsample)?;
        let filt = |mins: &[u64]| -> Vec<u64> {
            if target == 0 {
                mins.to_vec()
            } else {
                mins.iter().copied().filter(|h| *h < target).collect()
            }
        };
        Ok((filt(&self.mins), filt(&other.mins)))
    }

    /// Jaccard similarity after downsampling both sketches to the coarser
    /// resolution.
    pub fn similarity(&self, other: &MinHash, downsample: bool) -> Result<f64, SketchError> {
        self.check_compatible(other)?;
        let (a, b) = self.comparable_mins(other, downsample)?;
        Ok(jaccard(&a, &b))
    }

    /// Containment of `self` in `other`: `|self ∩ other| / |self|`.
    pub fn contained_by(&self, other: &MinHash, downsample: bool) -> Result<f64, SketchError> {
        self.check_compatible(other)?;
        let (a, b) = self.comparable_mins(other, downsample)?;
        if a.is_empty() {
            return Ok(0.0);
        }
        Ok(intersection_size(&a, &b) as f64 / a.len() as f64)
    }

    /// Jaccard similarity over the raw hash sets, ignoring any `max_hash`
    /// bound on either side. Used by gather
    /// once the query's bound has been lifted.
    pub fn similarity_ignore_maxhash(&self, other: &MinHash) -> f64 {
        jaccard(&self.mins, &other.mins)
    }

    /// Canonical content digest, independent of insertion
    /// order (`mins` is always kept sorted).
    pub fn md5sum(&self) -> String {
        let mut ctx = md5::Context::new();
        ctx.consume(self.ksize.to_le_bytes());
        ctx.consume([self.hash_function as u8]);
        ctx.consume(self.seed.to_le_bytes());
        ctx.consume(self.max_hash.to_le_bytes());
        for hash in &self.mins {
            ctx.consume(hash.to_le_bytes());
        }
        format!("{:x}", ctx.compute())
    }

    /// Downsample to a coarser (or equal) `max_hash` bound. Downsampling to
    /// a finer bound than the sketch already has is forbidden.
    pub fn downsample_max_hash(&self, new_max_hash: u64) -> Result<MinHash, SketchError> {
        if self.max_hash != 0 && (new_max_hash == 0 || new_max_hash > self.max_hash) {
            return Err(SketchError::CannotDownsampleFiner);
        }
        let mut out = MinHash {
            mins: Vec::new(),
            abunds: self.track_abundance.then(HashMap::new),
            ksize: self.ksize,
            hash_function: self.hash_function,
            seed: self.seed,
            max_hash: new_max_hash,
            track_abundance: self.track_abundance,
        };
        out.add_many(&self.mins);
        Ok(out)
    }

    pub fn downsample_scaled(&self, scaled: u64) -> Result<MinHash, SketchError> {
        self.downsample_max_hash(max_hash_for_scaled(scaled))
    }
}

/// Jaccard similarity of two sorted, deduplicated hash vectors.
fn jaccard(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let common = intersection_size(a, b);
    let union = a.len() + b.len() - common;
    if union == 0 {
        0.0
    } else {
        common as f64 / union as f64
    }
}

/// Size of the intersection of two sorted, deduplicated hash vectors, via a
/// linear merge over the sorted representation.
pub(crate) fn intersection_size(a: &[u64], b: &[u64]) -> usize {
    let (mut i, mut j) = (0, 0);
    let mut count = 0;
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

/// Intersection of two sorted, deduplicated hash vectors, preserving order.
pub(crate) fn sorted_intersection(a: &[u64], b: &[u64]) -> Vec<u64> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Set difference `a - b` of two sorted, deduplicated hash vectors.
pub(crate) fn sorted_difference(a: &[u64], b: &[u64]) -> Vec<u64> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() {
        if j >= b.len() || a[i] < b[j] {
            out.push(a[i]);
            i += 1;
        } else if a[i] == b[j] {
            i += 1;
            j += 1;
        } else {
            j += 1;
        }
    }
    out
}
