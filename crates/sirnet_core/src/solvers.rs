use ode_solvers::dop853::Dop853;
use ode_solvers::dopri5::Dopri5;
use ode_solvers::System;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SirError};
use crate::traits::DynamicalSystem;

type State = ode_solvers::DVector<f64>;

/// Explicit adaptive Runge-Kutta schemes available for day stepping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SolverMethod {
    /// Dormand-Prince 8(5,3).
    #[default]
    Dop853,
    /// Dormand-Prince 5(4).
    Dopri5,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct OdeSettings {
    pub method: SolverMethod,
    pub rtol: f64,
    pub atol: f64,
}

impl Default for OdeSettings {
    fn default() -> Self {
        Self {
            method: SolverMethod::Dop853,
            rtol: 1e-8,
            atol: 1e-10,
        }
    }
}

/// Adapts a [`DynamicalSystem`] to the `ode_solvers` right-hand side.
struct Rhs<'a, S: DynamicalSystem>(&'a S);

impl<S: DynamicalSystem> System<f64, State> for Rhs<'_, S> {
    fn system(&self, t: f64, y: &State, dy: &mut State) {
        self.0.apply(t, y.as_slice(), dy.as_mut_slice());
    }
}

/// Integrates `system` from t = 0 and returns the states at t = 1, 2, ..., `days`.
///
/// The solver runs half a day past the last sample so every requested day
/// falls strictly inside the integration span and comes from dense output.
pub fn advance_days<S: DynamicalSystem>(
    system: &S,
    x0: &[f64],
    days: usize,
    settings: &OdeSettings,
) -> Result<Vec<Vec<f64>>> {
    if x0.len() != system.dimension() {
        return Err(SirError::shape(format!(
            "initial state has {} entries, system dimension is {}",
            x0.len(),
            system.dimension()
        )));
    }
    if days == 0 {
        return Ok(Vec::new());
    }

    let y0 = State::from_column_slice(x0);
    let t_end = days as f64 + 0.5;
    let rhs = Rhs(system);

    let (times, states) = match settings.method {
        SolverMethod::Dop853 => {
            let mut stepper = Dop853::new(rhs, 0.0, t_end, 1.0, y0, settings.rtol, settings.atol);
            stepper
                .integrate()
                .map_err(|e| SirError::Integration(e.to_string()))?;
            (stepper.x_out().clone(), stepper.y_out().clone())
        }
        SolverMethod::Dopri5 => {
            let mut stepper = Dopri5::new(rhs, 0.0, t_end, 1.0, y0, settings.rtol, settings.atol);
            stepper
                .integrate()
                .map_err(|e| SirError::Integration(e.to_string()))?;
            (stepper.x_out().clone(), stepper.y_out().clone())
        }
    };

    let mut samples = Vec::with_capacity(days);
    for day in 1..=days {
        let target = day as f64;
        let idx = times
            .iter()
            .position(|t| (t - target).abs() < 1e-9)
            .ok_or_else(|| {
                SirError::Integration(format!("solver produced no output for day {day}"))
            })?;
        let state: Vec<f64> = states[idx].iter().copied().collect();
        if state.iter().any(|v| !v.is_finite()) {
            return Err(SirError::Integration(format!(
                "non-finite state at day {day}"
            )));
        }
        samples.push(state);
    }
    Ok(samples)
}

/// Final state after `days` days.
pub fn advance<S: DynamicalSystem>(
    system: &S,
    x0: &[f64],
    days: usize,
    settings: &OdeSettings,
) -> Result<Vec<f64>> {
    let mut samples = advance_days(system, x0, days, settings)?;
    Ok(samples.pop().unwrap_or_else(|| x0.to_vec()))
}
