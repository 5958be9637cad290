/// All errors that can occur within wren.
///
/// Most variants are *invariant violations*: they mean the graph handed to a
/// layer is malformed (wrong blob counts, in-place wiring where the layer
/// forbids it, counts that drifted after a reshape). No layer can produce a
/// meaningful result from such a graph, so callers must treat them as a
/// crash rather than retry. [`Error::is_fatal`] identifies them.
///
/// Layer-level messages always start with the layer type name so the
/// diagnostic points straight at the offending node.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An output blob is the same object as the input blob.
    #[error("{layer} layer does not allow in-place computation (output {index} is the input blob)")]
    InPlaceNotAllowed { layer: &'static str, index: usize },

    /// The same output blob appears twice in the output list.
    #[error("{layer} layer: output {index} duplicates output {first}")]
    DuplicateOutput {
        layer: &'static str,
        index: usize,
        first: usize,
    },

    /// An output's element count differs from the cached input count.
    #[error("{layer} layer: output count mismatch at output {index}: expected {expected}, got {got}")]
    CountMismatch {
        layer: &'static str,
        index: usize,
        expected: usize,
        got: usize,
    },

    /// Wrong number of input blobs.
    #[error("{layer} layer takes exactly {expected} input blob(s), got {got}")]
    InputCountMismatch {
        layer: &'static str,
        expected: usize,
        got: usize,
    },

    /// Fewer output blobs than the layer requires.
    #[error("{layer} layer requires at least {min} output blob(s), got {got}")]
    TooFewOutputs {
        layer: &'static str,
        min: usize,
        got: usize,
    },

    /// The propagate-down flag list does not match the inputs.
    #[error("{layer} layer: propagate_down has {got} flag(s) for {expected} input(s)")]
    PropagateDownMismatch {
        layer: &'static str,
        expected: usize,
        got: usize,
    },

    /// A selection buffer was required but never allocated.
    #[error("{layer} layer: output 0 carries no selection buffer")]
    MissingSelection { layer: &'static str },

    /// A selection buffer is shorter than the channel count being copied.
    #[error("selection buffer too short: need {needed} element(s), have {got}")]
    SelectionTooShort { needed: usize, got: usize },

    /// `share_data` between blobs of different element counts.
    #[error("cannot share data: blob has {expected} element(s), source has {got}")]
    ShareCountMismatch { expected: usize, got: usize },

    /// A kernel was asked to touch more elements than a buffer holds.
    #[error("{op} kernel: n = {n} exceeds buffer length {len}")]
    KernelLength {
        op: &'static str,
        n: usize,
        len: usize,
    },

    /// Data supplied to a blob does not match its element count.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: crate::Shape,
        expected: usize,
        got: usize,
    },

    /// Dimension index out of range for the shape's rank.
    #[error("dimension out of range: dim {dim} for shape with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// The layer does not implement this operation.
    #[error("{layer} layer does not support {op}")]
    Unsupported {
        layer: &'static str,
        op: &'static str,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Whether this error is an invariant violation that the executor must
    /// treat as unrecoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Msg(_) | Error::Unsupported { .. })
    }
}

/// Convenience Result type used throughout wren.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
