//! Surface Laplacian estimation on a triangulated sensor cloud.
//!
//! For every sensor around which a closed triangle fan exists, the
//! potential field is locally modeled as a second-order Taylor expansion
//! in a tangent frame, and the expansion parameters are estimated from
//! the potential differences to the fan neighbors by SVD backsubstitution.
//! The summed second derivatives are the Laplacian estimate.
//!
//! The expensive part — fan walks, tangent frames, and the SVD of each
//! local system — happens once in [`Laplacian::fit`]. Applying the fit to
//! a data frame is a cheap backsubstitution per sensor, and an epoch of
//! frames can be processed in parallel.
//!
//! Sensors whose fan does not close (rim sensors of an open sensor cap,
//! or sensors that never made it into the mesh) are excluded from the
//! output with a warning; [`Laplacian::channels`] reports which input
//! channels survived.
//!
//! # Output modes
//!
//! - [`LaplacianMode::Normal`] — one value per fitted sensor: the sum of
//!   the two tangential second derivatives. The sign convention counts a
//!   potential peak at the sensor as positive (differences are taken
//!   center minus neighbor).
//! - [`LaplacianMode::LocalReference`] — the plain mean of the neighbor
//!   potentials; no derivative machinery at all.
//! - [`LaplacianMode::AllDerivatives`] — all four Taylor parameters
//!   `(dP/dx, dP/dy, d²P/dx², d²P/dy²)` as four output items per sensor.
//!
//! The complete linear operator mapping input channels to output channels
//! is available from [`Laplacian::filter_matrix`] for inspection or reuse
//! as a static spatial filter.
//!
//! # References
//!
//! - Le, J., Menon, V., Gevins, A. (1994). "Local estimate of surface
//!   Laplacian derivation on a realistically shaped scalp surface and its
//!   performance on simulated data." Electroencephalography and clinical
//!   Neurophysiology 92, 433-441.

use nalgebra::{DMatrix, DVector, Dyn, Vector3, SVD};
use rayon::prelude::*;
use tracing::warn;

use crate::error::{MeshError, Result};
use crate::mesh::{SensorCloud, SensorId, TriangleMesh};

use super::triangulate::ConvexMesh;

/// Relative singular-value cutoff of the damped pseudoinverse.
const SVD_TOL: f64 = 1e-5;

/// Number of Taylor parameters of the planar second-order expansion.
const TAYLOR_PARAMETERS: usize = 4;

/// Output variant of the Laplacian engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaplacianMode {
    /// Sum of the two tangential second derivatives per sensor.
    Normal,
    /// Mean of the neighbor potentials per sensor.
    LocalReference,
    /// All four Taylor parameters per sensor.
    AllDerivatives,
}

/// The factored local system of one sensor.
struct QuadraticSolver {
    svd: SVD<f64, Dyn, Dyn>,
    threshold: f64,
}

impl QuadraticSolver {
    fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>> {
        self.svd
            .solve(b, self.threshold)
            .map_err(MeshError::Numerical)
    }
}

/// One fitted sensor: its input channel, the channels of its ordered fan
/// neighbors, and the factored system (absent in local-reference mode).
struct VertexFit {
    channel: usize,
    neighbors: Vec<usize>,
    solver: Option<QuadraticSolver>,
}

/// A per-sensor-layout fit of local quadratic surfaces, applied to many
/// data frames.
pub struct Laplacian {
    mode: LaplacianMode,
    fits: Vec<VertexFit>,
    n_channels: usize,
}

impl Laplacian {
    /// Build the fit cache for every sensor of `convex` with a closed
    /// triangle fan.
    ///
    /// Fails with [`MeshError::TooFewSensors`] when the cloud cannot
    /// support a local quadratic fit at all. Sensors with open fans are
    /// excluded with a warning, not an error.
    pub fn fit(convex: &ConvexMesh, mode: LaplacianMode) -> Result<Self> {
        let cloud = convex.cloud();
        if cloud.len() < 5 {
            return Err(MeshError::TooFewSensors {
                found: cloud.len(),
                needed: 5,
            });
        }

        let mesh = convex.mesh();
        let mut fits = Vec::new();
        for (v, _) in cloud.iter() {
            let channel = cloud.channel_of(v);
            let Some(ring) = fan_ring(mesh, v) else {
                warn!(channel, "triangle fan does not close, excluding sensor");
                continue;
            };
            let neighbors = ring.iter().map(|&n| cloud.channel_of(n)).collect();
            let solver = match mode {
                LaplacianMode::LocalReference => None,
                _ => Some(factor_local_system(cloud, mesh, v, &ring)),
            };
            fits.push(VertexFit {
                channel,
                neighbors,
                solver,
            });
        }

        Ok(Self {
            mode,
            fits,
            n_channels: cloud.len(),
        })
    }

    /// The output mode the fit was built for.
    #[inline]
    pub fn mode(&self) -> LaplacianMode {
        self.mode
    }

    /// Number of fitted sensors (output channels).
    #[inline]
    pub fn len(&self) -> usize {
        self.fits.len()
    }

    /// Whether no sensor could be fitted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    /// Input channel ordinals of the fitted sensors, in output order.
    pub fn channels(&self) -> Vec<usize> {
        self.fits.iter().map(|fit| fit.channel).collect()
    }

    /// Number of output items per fitted sensor: 4 in
    /// [`LaplacianMode::AllDerivatives`], 1 otherwise.
    pub fn output_width(&self) -> usize {
        match self.mode {
            LaplacianMode::AllDerivatives => TAYLOR_PARAMETERS,
            _ => 1,
        }
    }

    /// Apply the fit to one frame of potentials in input channel order.
    ///
    /// The output holds [`output_width`](Self::output_width) items per
    /// fitted sensor, in [`channels`](Self::channels) order.
    pub fn apply(&self, frame: &[f64]) -> Result<Vec<f64>> {
        if frame.len() != self.n_channels {
            return Err(MeshError::FrameLength {
                expected: self.n_channels,
                found: frame.len(),
            });
        }
        let mut out = Vec::with_capacity(self.fits.len() * self.output_width());
        for fit in &self.fits {
            match self.mode {
                LaplacianMode::LocalReference => {
                    let sum: f64 = fit.neighbors.iter().map(|&n| frame[n]).sum();
                    out.push(sum / fit.neighbors.len() as f64);
                }
                LaplacianMode::Normal => {
                    let x = solve_differences(fit, frame)?;
                    out.push(x[2] + x[3]);
                }
                LaplacianMode::AllDerivatives => {
                    let x = solve_differences(fit, frame)?;
                    out.extend_from_slice(x.as_slice());
                }
            }
        }
        Ok(out)
    }

    /// Apply the fit to an epoch of frames, in parallel across frames.
    pub fn apply_epoch(&self, frames: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        frames.par_iter().map(|frame| self.apply(frame)).collect()
    }

    /// Apply the fit to an epoch of frames on the calling thread.
    pub fn apply_epoch_sequential(&self, frames: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        frames.iter().map(|frame| self.apply(frame)).collect()
    }

    /// Derive the complete linear operator from input channels to output
    /// channels by backsubstituting indicator inhomogeneities instead of
    /// data.
    ///
    /// Row `r` of the matrix reproduces output channel `r` of a scalar
    /// [`apply`](Self::apply): `matrix * frame == apply(frame)`. In
    /// [`LaplacianMode::AllDerivatives`] the matrix rows carry the summed
    /// second derivatives, as in [`LaplacianMode::Normal`].
    pub fn filter_matrix(&self) -> Result<DMatrix<f64>> {
        let mut matrix = DMatrix::zeros(self.fits.len(), self.n_channels);
        for (row, fit) in self.fits.iter().enumerate() {
            match self.mode {
                LaplacianMode::LocalReference => {
                    let weight = 1.0 / fit.neighbors.len() as f64;
                    for &n in &fit.neighbors {
                        matrix[(row, n)] += weight;
                    }
                }
                _ => {
                    let solver = fit
                        .solver
                        .as_ref()
                        .ok_or(MeshError::Numerical("missing factorization"))?;
                    for col in 0..self.n_channels {
                        let b = if col == fit.channel {
                            DVector::repeat(fit.neighbors.len(), 1.0)
                        } else {
                            DVector::from_iterator(
                                fit.neighbors.len(),
                                fit.neighbors
                                    .iter()
                                    .map(|&n| if n == col { -1.0 } else { 0.0 }),
                            )
                        };
                        let x = solver.solve(&b)?;
                        matrix[(row, col)] = x[2] + x[3];
                    }
                }
            }
        }
        Ok(matrix)
    }
}

/// Backsubstitute the center-minus-neighbor potential differences of one
/// sensor. A positive difference towards the center counts positive.
fn solve_differences(fit: &VertexFit, frame: &[f64]) -> Result<DVector<f64>> {
    let solver = fit
        .solver
        .as_ref()
        .ok_or(MeshError::Numerical("missing factorization"))?;
    let center = frame[fit.channel];
    let b = DVector::from_iterator(
        fit.neighbors.len(),
        fit.neighbors.iter().map(|&n| center - frame[n]),
    );
    solver.solve(&b)
}

/// Walk the triangle fan around `v` and collect its ordered ring of
/// neighbor vertices. `None` when `v` is not in the mesh or the fan does
/// not close.
fn fan_ring(mesh: &TriangleMesh, v: SensorId) -> Option<Vec<SensorId>> {
    let first = mesh.find_with_vertex(mesh.first(), v)?;
    let start = mesh.get(first).rotated_to_start(v);
    let mut ring = vec![start.v1, start.v2];
    let mut current = first;
    let mut last = start.v2;
    loop {
        // The next fan triangle shares the edge (v, last); skip the one
        // we are standing on if the scan finds it first.
        let mut found = mesh.find_with_edge(mesh.first(), v, last);
        if found == Some(current) {
            found = mesh.find_with_edge(mesh.next(current), v, last);
        }
        let next_id = found?;
        let next = mesh.get(next_id).rotated_to_start(v);
        if ring.contains(&next.v2) {
            return Some(ring);
        }
        ring.push(next.v2);
        current = next_id;
        last = next.v2;
    }
}

/// Build and factor the local system of one sensor: a tangent frame
/// orthogonal to the mean adjacent-triangle normal, and one matrix row
/// `[dx, dy, dx²/2, dy²/2]` per fan neighbor. Singular values below
/// `1e-5` of the largest are truncated at solve time, guarding
/// rank-deficient neighbor geometries.
fn factor_local_system(
    cloud: &SensorCloud,
    mesh: &TriangleMesh,
    v: SensorId,
    ring: &[SensorId],
) -> QuadraticSolver {
    let mut normal = Vector3::zeros();
    let mut at = mesh.find_with_vertex(mesh.first(), v);
    while let Some(id) = at {
        normal += mesh.get(id).normal(cloud);
        at = mesh.find_with_vertex(mesh.next(id), v);
    }
    let normal = normal.normalize();

    // Any tangent direction works for ex; the first fan neighbor is a
    // nonzero offset by construction.
    let origin = cloud.position(v);
    let seed = cloud.position(ring[0]) - origin;
    let ex = (seed - normal * seed.dot(&normal)).normalize();
    let ey = normal.cross(&ex);

    let mut u = DMatrix::zeros(ring.len(), TAYLOR_PARAMETERS);
    for (i, &neighbor) in ring.iter().enumerate() {
        let dp = cloud.position(neighbor) - origin;
        let dx = ex.dot(&dp);
        let dy = ey.dot(&dp);
        u[(i, 0)] = dx;
        u[(i, 1)] = dy;
        u[(i, 2)] = dx * dx * 0.5;
        u[(i, 3)] = dy * dy * 0.5;
    }

    let svd = u.svd(true, true);
    let threshold = SVD_TOL * svd.singular_values.max();
    QuadraticSolver { svd, threshold }
}
