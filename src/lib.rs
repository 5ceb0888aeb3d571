//! # Calvaria
//!
//! Surface triangulation of sparse sensor arrays and surface Laplacian
//! estimation, for EEG/MEG-style electrode layouts.
//!
//! Calvaria turns the positions of a roughly spherical cloud of sensors
//! into a triangulated surface mesh, then uses that mesh to compute
//! discrete local spatial derivatives of per-sample scalar data. Both the
//! mesh and the per-sensor derivative fits are expensive to build but
//! cheap to reuse: they are constructed once per sensor layout and then
//! applied to any number of data frames.
//!
//! ## Features
//!
//! - **Boundary-driven triangulation**: incremental hull growth with
//!   ear clipping and an edge-flip relaxation pass
//! - **Angular metric**: growth follows the curvature of a fitted sphere,
//!   with a documented fallback for near-flat layouts
//! - **Surface Laplacian**: per-sensor quadratic Taylor fits solved by
//!   truncated SVD, with local-reference and all-derivatives variants and
//!   an inspectable spatial filter matrix
//! - **Checked handles**: every cross-reference is a generation-checked
//!   arena handle, never a raw pointer
//!
//! ## Quick Start
//!
//! ```
//! use calvaria::prelude::*;
//! use nalgebra::Point3;
//!
//! // Sensor positions in input channel order (here: a tiny cap).
//! let mut positions = vec![Point3::new(0.0, 0.0, 1.0)];
//! for k in 0..8 {
//!     let phi = k as f64 / 8.0 * std::f64::consts::TAU;
//!     positions.push(Point3::new(0.7 * phi.cos(), 0.7 * phi.sin(), 0.7));
//! }
//!
//! // Build the mesh once per layout...
//! let cloud = SensorCloud::from_positions(&positions);
//! let mesh = ConvexMesh::build(cloud)?;
//!
//! // ...fit the Laplacian once...
//! let laplacian = Laplacian::fit(&mesh, LaplacianMode::Normal)?;
//!
//! // ...and apply it to as many frames as needed.
//! let frame = vec![1.0; 9];
//! let filtered = laplacian.apply(&frame)?;
//! assert_eq!(filtered.len(), laplacian.len());
//! # Ok::<(), calvaria::error::MeshError>(())
//! ```
//!
//! ## Data model
//!
//! A [`SensorCloud`](mesh::SensorCloud) owns the positions; everything
//! else — boundary entries, triangle vertices, fan neighbors — refers to
//! sensors by [`SensorId`](mesh::SensorId) handle. Handles are generation
//! checked, so use-after-removal is a detected condition instead of
//! undefined behavior. The [`ConvexMesh`](algo::ConvexMesh) owns its
//! cloud for its whole lifetime, which keeps every derived reference
//! structurally valid.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// ```
/// use calvaria::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::{BuildOptions, ConvexMesh, Laplacian, LaplacianMode};
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        Boundary, BoundaryId, RingList, Sensor, SensorCloud, SensorId, Triangle, TriangleId,
        TriangleMesh,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
