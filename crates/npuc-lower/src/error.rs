//! Error types for the lowering pass.

/// Errors surfaced by the conversion pass.
///
/// All errors are fatal: the partially built graph is discarded and
/// nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum LowerError {
    /// The operation cannot run on the hardware (oracle verdict,
    /// unrecognised pooling configuration, shared concatenation inputs).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The operation is known but has no lowering yet.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}
