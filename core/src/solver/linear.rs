//! Dense linear step `J * dx = rhs`.
//!
//! Square systems go through LU. Singular, ill-conditioned or rectangular
//! systems use an SVD damped pseudo-inverse, which gives the least-squares
//! step for over-determined systems and the minimum-norm step for
//! under-determined ones. A diagonal approximation is the last resort when
//! the SVD does not converge.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Relative residual above which an LU solution is rejected.
const LU_ACCEPT_RESIDUAL: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMethod {
    Lu,
    PseudoInverse,
    Diagonal,
}

pub fn solve_step(jacobian: &DMatrix<f64>, rhs: &DVector<f64>, damping: f64) -> (DVector<f64>, StepMethod) {
    let cols = jacobian.ncols();
    if cols == 0 {
        return (DVector::zeros(0), StepMethod::Lu);
    }

    if jacobian.is_square() {
        if let Some(dx) = jacobian.clone().lu().solve(rhs) {
            let residual = (jacobian * &dx - rhs).norm();
            if is_finite(&dx) && residual <= LU_ACCEPT_RESIDUAL * (1.0 + rhs.norm()) {
                return (dx, StepMethod::Lu);
            }
        }
        debug!("LU step rejected, falling back to pseudo-inverse");
    }

    if let Some(dx) = damped_pseudo_inverse(jacobian, rhs, damping) {
        if is_finite(&dx) {
            return (dx, StepMethod::PseudoInverse);
        }
    }

    debug!("SVD did not converge, using diagonal approximation");
    (diagonal_step(jacobian, rhs), StepMethod::Diagonal)
}

/// `dx = V * diag(s / (s^2 + mu^2)) * U^T * rhs`, dropping singular values
/// below the numerical rank cutoff.
fn damped_pseudo_inverse(jacobian: &DMatrix<f64>, rhs: &DVector<f64>, damping: f64) -> Option<DVector<f64>> {
    let svd = jacobian.clone().try_svd(true, true, f64::EPSILON, 0)?;
    let u = svd.u.as_ref()?;
    let v_t = svd.v_t.as_ref()?;

    let sigma_max = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let cutoff = sigma_max * f64::EPSILON * jacobian.nrows().max(jacobian.ncols()) as f64;
    let mu_sq = damping * damping;

    let mut projected = u.transpose() * rhs;
    for (i, value) in projected.iter_mut().enumerate() {
        let sigma = svd.singular_values[i];
        *value = if sigma <= cutoff || sigma == 0.0 {
            0.0
        } else {
            *value * sigma / (sigma * sigma + mu_sq)
        };
    }
    Some(v_t.transpose() * projected)
}

/// `dx_j = (J^T rhs)_j / (J^T J)_jj`, ignoring off-diagonal coupling.
fn diagonal_step(jacobian: &DMatrix<f64>, rhs: &DVector<f64>) -> DVector<f64> {
    let gradient = jacobian.transpose() * rhs;
    DVector::from_iterator(
        jacobian.ncols(),
        jacobian.column_iter().zip(gradient.iter()).map(|(column, g)| {
            let weight = column.norm_squared();
            if weight > f64::EPSILON {
                g / weight
            } else {
                0.0
            }
        }),
    )
}

fn is_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}
