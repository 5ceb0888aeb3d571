//! Algorithms over the mesh data structures.
//!
//! - [`triangulate`] — one-shot construction of a [`ConvexMesh`] from a
//!   sensor cloud: sphere fit, ear-clipping boundary reduction, boundary
//!   growth, and edge-flip revision.
//! - [`laplacian`] — per-sensor local quadratic surface fits over a built
//!   mesh, applied to data frames as a surface Laplacian (or as a local
//!   reference, or yielding all Taylor parameters).
//! - [`powell`] — the derivative-free minimizer behind the sphere fit.
//!
//! [`ConvexMesh`]: triangulate::ConvexMesh

pub mod laplacian;
pub mod powell;
pub mod triangulate;

pub use laplacian::{Laplacian, LaplacianMode};
pub use powell::{minimize, MinimizeResult};
pub use triangulate::{BuildOptions, ConvexMesh};
