//! SIR vector field over a network of communities.
//!
//! The flattened state is `[S_0..S_{n-1}, I_0..I_{n-1}]`. Recovered fractions
//! are implicit (R = 1 - S - I) and never stored.

use nalgebra::DMatrix;

use crate::error::{Result, SirError};
use crate::traits::DynamicalSystem;

/// dS_i/dt = -b S_i (B I)_i, dI_i/dt = b S_i (B I)_i - gamma I_i.
#[derive(Debug, Clone, Copy)]
pub struct SirSystem<'a> {
    coupling: &'a DMatrix<f64>,
    scale: f64,
    gamma: f64,
}

impl<'a> SirSystem<'a> {
    pub fn new(coupling: &'a DMatrix<f64>, gamma: f64) -> Self {
        Self {
            coupling,
            scale: 1.0,
            gamma,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn communities(&self) -> usize {
        self.coupling.nrows()
    }

    /// Scaled force of infection b (B I)_i for every community.
    fn force(&self, infected: &[f64]) -> Vec<f64> {
        self.coupling
            .row_iter()
            .map(|row| {
                self.scale
                    * row
                        .iter()
                        .zip(infected)
                        .map(|(b, i)| b * i)
                        .sum::<f64>()
            })
            .collect()
    }
}

impl DynamicalSystem for SirSystem<'_> {
    fn dimension(&self) -> usize {
        2 * self.communities()
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let n = self.communities();
        let (s, i) = x.split_at(n);
        let force = self.force(i);
        for k in 0..n {
            let ds = -s[k] * force[k];
            out[k] = ds;
            out[n + k] = -ds - self.gamma * i[k];
        }
    }

    fn jacobian(&self, _t: f64, x: &[f64]) -> DMatrix<f64> {
        let n = self.communities();
        let (s, i) = x.split_at(n);
        let force = self.force(i);
        let mut jac = DMatrix::zeros(2 * n, 2 * n);
        for r in 0..n {
            jac[(r, r)] = -force[r];
            jac[(n + r, r)] = force[r];
            for c in 0..n {
                let coupled = self.scale * s[r] * self.coupling[(r, c)];
                jac[(r, n + c)] = -coupled;
                jac[(n + r, n + c)] = coupled;
            }
            jac[(n + r, n + r)] -= self.gamma;
        }
        jac
    }
}

/// Splits a flattened state into its (S, I) halves.
pub fn split_state(x: &[f64], n: usize) -> (&[f64], &[f64]) {
    x[..2 * n].split_at(n)
}

pub fn join_state(susceptible: &[f64], infected: &[f64]) -> Vec<f64> {
    let mut x = Vec::with_capacity(susceptible.len() + infected.len());
    x.extend_from_slice(susceptible);
    x.extend_from_slice(infected);
    x
}

/// Population-weighted mean of per-community values.
pub fn aggregate_fraction(values: &[f64], population: &[f64]) -> f64 {
    let total: f64 = population.iter().sum();
    values
        .iter()
        .zip(population)
        .map(|(v, p)| v * p)
        .sum::<f64>()
        / total
}

/// Population-weighted fraction of infected or recovered individuals (1 - S).
pub fn infected_fraction(x: &[f64], population: &[f64]) -> f64 {
    let (s, _) = split_state(x, population.len());
    let touched: Vec<f64> = s.iter().map(|v| 1.0 - v).collect();
    aggregate_fraction(&touched, population)
}

/// Checks that `coupling` is square and matches `n` communities.
pub fn check_coupling(coupling: &DMatrix<f64>, n: usize) -> Result<()> {
    if coupling.nrows() != coupling.ncols() {
        return Err(SirError::shape(format!(
            "coupling matrix must be square, got {}x{}",
            coupling.nrows(),
            coupling.ncols()
        )));
    }
    if coupling.nrows() != n {
        return Err(SirError::shape(format!(
            "coupling matrix has {} communities, state has {}",
            coupling.nrows(),
            n
        )));
    }
    Ok(())
}

pub fn check_population(population: &[f64], n: usize) -> Result<()> {
    if population.len() != n {
        return Err(SirError::shape(format!(
            "population has {} entries, expected {}",
            population.len(),
            n
        )));
    }
    if population.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err(SirError::invalid("population entries must be positive"));
    }
    Ok(())
}
