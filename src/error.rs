//! Error types for calvaria.
//!
//! Only unrecoverable conditions surface as errors. Numerical degeneracies
//! (near-flat sensor layouts, rank-deficient local fits) are handled by
//! documented fallbacks inside the algorithms, and sensors whose triangle
//! fan does not close are excluded from the Laplacian output with a
//! warning instead of failing the run.

use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh construction or Laplacian estimation.
#[derive(Error, Debug)]
pub enum MeshError {
    /// Not enough sensors for the requested operation.
    ///
    /// Triangulation needs at least 3 sensors to seed a triangle; the
    /// Laplacian needs at least 5 to support a local quadratic fit.
    #[error("too few sensors ({found} < {needed})")]
    TooFewSensors {
        /// Number of sensors provided.
        found: usize,
        /// Minimum number required.
        needed: usize,
    },

    /// Mesh construction stopped making progress.
    ///
    /// A full construction round neither clipped a boundary vertex nor
    /// attached an outside sensor while unmeshed sensors remained.
    #[error("mesh construction stalled with {outside_remaining} sensors unattached")]
    ConstructionStalled {
        /// Number of sensors still outside the mesh.
        outside_remaining: usize,
    },

    /// A data frame does not match the sensor layout the fit was built for.
    #[error("frame has {found} channels, expected {expected}")]
    FrameLength {
        /// Number of channels the fit expects.
        expected: usize,
        /// Number of channels in the offending frame.
        found: usize,
    },

    /// A numerical primitive reported failure.
    #[error("numerical primitive failed: {0}")]
    Numerical(&'static str),
}
