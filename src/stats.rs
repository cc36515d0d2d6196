//! Numerical helpers for adaptation: the standard normal quantile used by
//! the tuning rule, the empirical covariance of visited states, and the
//! Cholesky factor that turns a covariance into a proposal.

use nalgebra as na;
use ndarray::prelude::*;
use ndarray_stats::CorrelationExt;

/// Inverse CDF of the standard normal distribution.
///
/// Acklam's rational approximation, relative error below 1.2e-9 on `(0, 1)`.
/// Returns `-inf`/`inf` at 0/1 and NaN outside the unit interval.
pub fn standard_normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Sample covariance (denominator `n - 1`) of the selected columns of
/// `samples`, where each row is one observation.
///
/// Returns `None` with fewer than two rows.
pub fn covariance(samples: ArrayView2<f64>, columns: &[usize]) -> Option<na::DMatrix<f64>> {
    if samples.nrows() < 2 {
        return None;
    }
    let selected = samples.select(Axis(1), columns);
    // `cov` treats rows as variables and columns as observations.
    let cov = selected.t().cov(1.0).ok()?;
    let dim = columns.len();
    Some(na::DMatrix::from_fn(dim, dim, |i, j| cov[(i, j)]))
}

/// Lower Cholesky factor of `scale * cov`, or `None` when that matrix is
/// not symmetric positive definite or has non-finite entries.
pub fn scaled_cholesky(cov: &na::DMatrix<f64>, scale: f64) -> Option<na::DMatrix<f64>> {
    if !cov.is_square() || cov.iter().any(|x| !x.is_finite()) || !is_symmetric(cov) {
        return None;
    }
    na::Cholesky::new(cov * scale).map(|chol| chol.l())
}

pub fn is_symmetric(m: &na::DMatrix<f64>) -> bool {
    let tol = 1e-9 * m.amax().max(1.0);
    m.is_square()
        && (0..m.nrows()).all(|i| (0..i).all(|j| (m[(i, j)] - m[(j, i)]).abs() <= tol))
}
