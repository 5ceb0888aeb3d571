//! Derivative-free multidimensional minimization.
//!
//! Powell's direction-set method: line-minimize along each member of a
//! direction set in turn, then replace the direction of largest decrease
//! with the net displacement of the whole cycle when that is profitable.
//! Line minimization brackets the minimum by golden-ratio expansion and
//! polishes it with Brent's parabolic interpolation. No derivatives are
//! ever evaluated.
//!
//! The sphere fit is the only consumer inside this crate, but the routine
//! is generic over any objective on a fixed-size parameter vector.
//!
//! # References
//!
//! - Press, W. H., et al. (1992). "Numerical Recipes in C", 2nd ed.,
//!   §10.5 (Powell), §10.1-10.2 (bracketing and Brent).

use tracing::warn;

/// Outcome of a [`minimize`] call.
#[derive(Debug, Clone)]
pub struct MinimizeResult {
    /// The refined parameter vector.
    pub point: Vec<f64>,
    /// The objective value at [`point`](Self::point).
    pub value: f64,
    /// Number of direction-set cycles taken.
    pub iterations: usize,
}

/// Maximum number of direction-set cycles.
const ITMAX: usize = 200;

/// Fractional tolerance of the line minimization.
const LINE_TOL: f64 = 2.0e-4;

const GOLD: f64 = 1.618034;
const GLIMIT: f64 = 100.0;
const TINY: f64 = 1.0e-20;
/// The golden section, `(3 - sqrt(5)) / 2`.
const CGOLD: f64 = 0.381_966_0;
const ZEPS: f64 = 1.0e-10;
const BRENT_ITMAX: usize = 100;

/// Minimize `f` starting from `start`.
///
/// `ftol` is the fractional tolerance in the objective value: a full
/// direction-set cycle that fails to decrease it by more than this amount
/// ends the search. If convergence is not reached within an internal
/// iteration cap, the best point found so far is returned and a warning
/// is emitted.
pub fn minimize<F>(mut f: F, start: &[f64], ftol: f64) -> MinimizeResult
where
    F: FnMut(&[f64]) -> f64,
{
    let n = start.len();
    let mut p = start.to_vec();
    let mut directions: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut e = vec![0.0; n];
            e[i] = 1.0;
            e
        })
        .collect();

    let mut fret = f(&p);
    let mut pt = p.clone();
    let mut xt = vec![0.0; n];

    for iteration in 1usize.. {
        let fp = fret;
        let mut ibig = 0;
        let mut del = 0.0;

        for (i, direction) in directions.iter().enumerate() {
            let mut xi = direction.clone();
            let fptt = fret;
            fret = line_minimize(&mut f, &mut p, &mut xi, &mut xt);
            if (fptt - fret).abs() > del {
                del = (fptt - fret).abs();
                ibig = i;
            }
        }

        if 2.0 * (fp - fret).abs() <= ftol * (fp.abs() + fret.abs()) {
            return MinimizeResult {
                point: p,
                value: fret,
                iterations: iteration,
            };
        }
        if iteration == ITMAX {
            warn!(iterations = iteration, "powell: iteration cap reached");
            return MinimizeResult {
                point: p,
                value: fret,
                iterations: iteration,
            };
        }

        // Extrapolate along the net displacement of this cycle and decide
        // whether it should replace the direction of largest decrease.
        let mut ptt = vec![0.0; n];
        let mut xi = vec![0.0; n];
        for j in 0..n {
            ptt[j] = 2.0 * p[j] - pt[j];
            xi[j] = p[j] - pt[j];
            pt[j] = p[j];
        }
        let fptt = f(&ptt);
        if fptt < fp {
            let t = 2.0 * (fp - 2.0 * fret + fptt) * (fp - fret - del).powi(2)
                - del * (fp - fptt).powi(2);
            if t < 0.0 {
                fret = line_minimize(&mut f, &mut p, &mut xi, &mut xt);
                directions[ibig] = directions[n - 1].clone();
                directions[n - 1] = xi;
            }
        }
    }
    unreachable!()
}

/// Minimize `f` along the line through `p` in direction `xi`.
///
/// On return `p` is the line minimum, `xi` the actual displacement, and
/// the value at the minimum is returned. `xt` is scratch space.
fn line_minimize<F>(f: &mut F, p: &mut [f64], xi: &mut [f64], xt: &mut [f64]) -> f64
where
    F: FnMut(&[f64]) -> f64,
{
    let n = p.len();
    let xmin;
    let fmin;
    {
        let mut along = |x: f64| {
            for j in 0..n {
                xt[j] = p[j] + x * xi[j];
            }
            f(xt)
        };
        let (ax, bx, cx, _, fb, _) = bracket(&mut along, 0.0, 1.0);
        let (x, fx) = brent(&mut along, ax, bx, cx, fb, LINE_TOL);
        xmin = x;
        fmin = fx;
    }
    for j in 0..n {
        xi[j] *= xmin;
        p[j] += xi[j];
    }
    fmin
}

/// Bracket a minimum of `f` by downhill golden-ratio expansion from the
/// initial points `ax`, `bx`. Returns `(ax, bx, cx, fa, fb, fc)` with
/// `bx` between `ax` and `cx` and `fb <= fa, fc`.
fn bracket<F>(f: &mut F, ax0: f64, bx0: f64) -> (f64, f64, f64, f64, f64, f64)
where
    F: FnMut(f64) -> f64,
{
    let (mut ax, mut bx) = (ax0, bx0);
    let mut fa = f(ax);
    let mut fb = f(bx);
    if fb > fa {
        std::mem::swap(&mut ax, &mut bx);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut cx = bx + GOLD * (bx - ax);
    let mut fc = f(cx);

    while fb > fc {
        let r = (bx - ax) * (fb - fc);
        let q = (bx - cx) * (fb - fa);
        let denom = 2.0 * (q - r).abs().max(TINY).copysign(q - r);
        let mut u = bx - ((bx - cx) * q - (bx - ax) * r) / denom;
        let ulim = bx + GLIMIT * (cx - bx);
        let mut fu;
        if (bx - u) * (u - cx) > 0.0 {
            // Parabolic candidate between b and c.
            fu = f(u);
            if fu < fc {
                return (bx, u, cx, fb, fu, fc);
            } else if fu > fb {
                return (ax, bx, u, fa, fb, fu);
            }
            u = cx + GOLD * (cx - bx);
            fu = f(u);
        } else if (cx - u) * (u - ulim) > 0.0 {
            // Candidate beyond c but within the step limit.
            fu = f(u);
            if fu < fc {
                bx = cx;
                cx = u;
                u = cx + GOLD * (cx - bx);
                fb = fc;
                fc = fu;
                fu = f(u);
            }
        } else if (u - ulim) * (ulim - cx) >= 0.0 {
            u = ulim;
            fu = f(u);
        } else {
            u = cx + GOLD * (cx - bx);
            fu = f(u);
        }
        ax = bx;
        bx = cx;
        cx = u;
        fa = fb;
        fb = fc;
        fc = fu;
    }
    (ax, bx, cx, fa, fb, fc)
}

/// Brent's line minimization on the bracket `(ax, bx, cx)` with the value
/// `fb` at `bx`. Returns `(xmin, fmin)`.
fn brent<F>(f: &mut F, ax: f64, bx: f64, cx: f64, fb: f64, tol: f64) -> (f64, f64)
where
    F: FnMut(f64) -> f64,
{
    let mut a = ax.min(cx);
    let mut b = ax.max(cx);
    let (mut x, mut w, mut v) = (bx, bx, bx);
    let (mut fx, mut fw, mut fv) = (fb, fb, fb);
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for _ in 0..BRENT_ITMAX {
        let xm = 0.5 * (a + b);
        let tol1 = tol * x.abs() + ZEPS;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return (x, fx);
        }
        let mut use_golden = true;
        if e.abs() > tol1 {
            // Trial parabolic fit through x, v, w.
            let r = (x - w) * (fx - fv);
            let q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            let mut q2 = 2.0 * (q - r);
            if q2 > 0.0 {
                p = -p;
            }
            q2 = q2.abs();
            let etemp = e;
            e = d;
            if p.abs() < (0.5 * q2 * etemp).abs() && p > q2 * (a - x) && p < q2 * (b - x) {
                d = p / q2;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
                use_golden = false;
            }
        }
        if use_golden {
            e = if x >= xm { a - x } else { b - x };
            d = CGOLD * e;
        }
        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + tol1.copysign(d)
        };
        let fu = f(u);
        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            w = x;
            x = u;
            fv = fw;
            fw = fx;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                w = u;
                fv = fw;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }
    (x, fx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let f = |p: &[f64]| (p[0] - 1.0).powi(2) + (p[1] + 2.0).powi(2) + 3.0;
        let result = minimize(f, &[0.0, 0.0], 1e-8);
        assert!((result.point[0] - 1.0).abs() < 1e-4);
        assert!((result.point[1] + 2.0).abs() < 1e-4);
        assert!((result.value - 3.0).abs() < 1e-7);
        assert!(result.iterations >= 1);
    }

    #[test]
    fn test_anisotropic_quadratic() {
        // Strongly different curvatures along the axes.
        let f = |p: &[f64]| 100.0 * p[0] * p[0] + 0.01 * (p[1] - 5.0).powi(2);
        let result = minimize(f, &[3.0, -3.0], 1e-10);
        assert!(result.point[0].abs() < 1e-3);
        assert!((result.point[1] - 5.0).abs() < 1e-2);
    }

    #[test]
    fn test_coupled_quadratic_uses_direction_update() {
        // A rotated valley; progress requires leaving the unit directions.
        let f = |p: &[f64]| {
            let u = p[0] + p[1];
            let v = p[0] - p[1];
            10.0 * u * u + 0.1 * (v - 2.0).powi(2)
        };
        let result = minimize(f, &[4.0, 4.0], 1e-10);
        assert!(result.value < 1e-6, "value {}", result.value);
        assert!((result.point[0] - result.point[1] - 2.0).abs() < 1e-2);
    }

    #[test]
    fn test_already_at_minimum() {
        let f = |p: &[f64]| p[0] * p[0];
        let result = minimize(f, &[0.0], 1e-6);
        assert!(result.point[0].abs() < 1e-6);
        assert!(result.value < 1e-10);
    }
}
