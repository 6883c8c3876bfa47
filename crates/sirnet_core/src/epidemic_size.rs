//! Final epidemic size from a symmetric infectivity matrix.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SirError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EpidemicSizeSettings {
    pub max_iterations: usize,
    pub rtol_stop: f64,
    /// Treat running out of iterations as an error instead of a warning.
    pub strict: bool,
}

impl Default for EpidemicSizeSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            rtol_stop: 1e-8,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpidemicSize {
    /// Mean over communities of the final infected-or-recovered fraction.
    pub omega: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Relative change of the last iteration.
    pub rtol: f64,
}

/// Iterates X <- M (1 - (1 - eps) exp(-X)) / gamma from X = 0.
///
/// Without `strict`, running out of iterations only logs a warning and the
/// last iterate is returned with `converged == false`.
pub fn epidemic_size(
    infectivity: &DMatrix<f64>,
    seed: &[f64],
    gamma: f64,
    settings: &EpidemicSizeSettings,
) -> Result<EpidemicSize> {
    let n = infectivity.nrows();
    if infectivity.ncols() != n {
        return Err(SirError::shape(format!(
            "infectivity matrix must be square, got {}x{}",
            n,
            infectivity.ncols()
        )));
    }
    if seed.len() != n {
        return Err(SirError::shape(format!(
            "seed has {} entries, expected {}",
            seed.len(),
            n
        )));
    }
    if !(gamma > 0.0) {
        return Err(SirError::invalid(format!(
            "recovery rate must be positive, got {gamma}"
        )));
    }
    if settings.max_iterations == 0 {
        return Err(SirError::invalid("max_iterations must be greater than zero"));
    }

    let seed = DVector::from_column_slice(seed);
    let attack = |x: &DVector<f64>| {
        DVector::from_iterator(
            n,
            x.iter()
                .zip(seed.iter())
                .map(|(xi, ei)| 1.0 - (1.0 - ei) * (-xi).exp()),
        )
    };

    let mut x = DVector::zeros(n);
    let mut rtol = f64::INFINITY;
    let mut iterations = 0usize;
    let mut converged = false;

    while iterations < settings.max_iterations {
        let next = (infectivity * attack(&x)) / gamma;
        let denom = x.norm() + next.norm();
        rtol = if denom > 0.0 {
            2.0 * (&next - &x).norm() / denom
        } else {
            0.0
        };
        x = next;
        iterations += 1;
        if rtol < settings.rtol_stop {
            converged = true;
            break;
        }
    }

    if !converged {
        if settings.strict {
            return Err(SirError::Convergence { iterations, rtol });
        }
        log::warn!(
            "Epidemic size iteration did not converge after {} iterations (rtol = {:.6e}).",
            iterations,
            rtol
        );
    }

    let omega = attack(&x).sum() / n as f64;
    Ok(EpidemicSize {
        omega,
        iterations,
        converged,
        rtol,
    })
}

/// Normalizes a raw flux matrix into a symmetric infectivity matrix.
///
/// The diagonal of `flux` holds each community's self-flux p_i. Off-diagonal
/// flux is summed in both directions, rows are divided by p_i (rows with
/// p_i <= 0 are zeroed), and the result is symmetrized.
pub fn infectivity_matrix(flux: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = flux.nrows();
    if flux.ncols() != n {
        return Err(SirError::shape(format!(
            "flux matrix must be square, got {}x{}",
            n,
            flux.ncols()
        )));
    }

    let self_flux = flux.diagonal();
    let mut links = flux + flux.transpose();
    links.set_diagonal(&self_flux);
    for (i, mut row) in links.row_iter_mut().enumerate() {
        let p = self_flux[i];
        let inv = if p > 0.0 { 1.0 / p } else { 0.0 };
        row *= inv;
    }
    Ok((&links + links.transpose()) * 0.5)
}
