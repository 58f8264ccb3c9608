/// Error types for the sketch-search and gather core.
use thiserror::Error;

/// Sketch-level compatibility and resolution failures raised by comparison
/// operations (`similarity`, `contained_by`, downsampling).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SketchError {
    #[error("mismatch in k-mer sizes")]
    MismatchKSizes,

    #[error("mismatch in molecule type (DNA/protein/dayhoff/hp)")]
    MismatchDNAProt,

    #[error("mismatch in scaled resolution")]
    MismatchScaled,

    #[error("mismatch in seed")]
    MismatchSeed,

    #[error("cannot downsample to a finer resolution than the sketch already has")]
    CannotDownsampleFiner,
}

/// Fatal conditions raised by the search/gather engines themselves.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Sketch(#[from] SketchError),

    #[error(
        "Best hash match in gather has no max_hash\n\
         Please prepare database of sequences with a scaled value"
    )]
    NotScaled,
}
