//! Scalar root finding on a bracketing interval.

use argmin::core::{CostFunction, Executor, TerminationReason, TerminationStatus};
use argmin::solver::brent::BrentRoot;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SirError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RootSettings {
    /// Absolute tolerance on the root; argmin adds a relative term of 2·EPS·|x|.
    pub xtol: f64,
    pub max_iterations: u64,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            xtol: 2e-12,
            max_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Root {
    pub x: f64,
    pub iterations: u64,
}

/// Brent's method on `[lo, hi]` with objective values `f_lo` and `f_hi`
/// already known at the ends; they must differ in sign.
///
/// Objective failures surface as the `SirError` the objective returned.
pub fn brent<P>(
    problem: P,
    (lo, f_lo): (f64, f64),
    (hi, f_hi): (f64, f64),
    settings: &RootSettings,
) -> Result<Root>
where
    P: CostFunction<Param = f64, Output = f64>,
{
    if f_lo * f_hi > 0.0 {
        return Err(SirError::Bracketing {
            lo,
            hi,
            f_lo,
            f_hi,
            message: "objective has the same sign at both ends".to_string(),
        });
    }
    if f_lo == 0.0 {
        return Ok(Root { x: lo, iterations: 0 });
    }
    if f_hi == 0.0 {
        return Ok(Root { x: hi, iterations: 0 });
    }

    let solver = BrentRoot::new(lo, hi, settings.xtol);
    let result = Executor::new(problem, solver)
        .configure(|state| state.max_iters(settings.max_iterations))
        .run()
        .map_err(from_solver_error)?;

    let state = result.state();
    if let TerminationStatus::Terminated(TerminationReason::MaxItersReached) =
        state.termination_status
    {
        return Err(SirError::Fitting {
            iterations: state.iter as usize,
            message: format!(
                "root in [{:e}, {:e}] not resolved to {:e}, last x = {:?}",
                lo, hi, settings.xtol, state.param
            ),
        });
    }
    let x = state.param.ok_or_else(|| SirError::Fitting {
        iterations: state.iter as usize,
        message: "solver returned no root estimate".to_string(),
    })?;
    Ok(Root {
        x,
        iterations: state.iter,
    })
}

fn from_solver_error(err: argmin::core::Error) -> SirError {
    match err.downcast::<SirError>() {
        Ok(inner) => inner,
        Err(other) => SirError::Fitting {
            iterations: 0,
            message: other.to_string(),
        },
    }
}

/// Grows `hi` geometrically until `f(hi) >= 0`.
///
/// Returns the accepted upper end and its objective value. `attempts` counts
/// evaluations, the first one at `start`.
pub fn expand_upper<F>(
    mut f: F,
    lo: f64,
    f_lo: f64,
    start: f64,
    growth: f64,
    attempts: usize,
) -> Result<(f64, f64)>
where
    F: FnMut(f64) -> Result<f64>,
{
    let mut hi = start;
    let mut f_hi = f64::NEG_INFINITY;
    for attempt in 0..attempts {
        f_hi = f(hi)?;
        if f_hi >= 0.0 {
            return Ok((hi, f_hi));
        }
        if attempt + 1 < attempts {
            hi *= growth;
        }
    }
    Err(SirError::Bracketing {
        lo,
        hi,
        f_lo,
        f_hi,
        message: format!("objective stayed negative after {attempts} expansions by x{growth}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scalar objective given as a closure.
    struct Curve<F>(F);

    impl<F: Fn(f64) -> Result<f64>> CostFunction for Curve<F> {
        type Param = f64;
        type Output = f64;

        fn cost(&self, x: &f64) -> std::result::Result<f64, argmin::core::Error> {
            Ok((self.0)(*x)?)
        }
    }

    fn solve<F>(f: F, lo: f64, hi: f64, settings: &RootSettings) -> Result<Root>
    where
        F: Fn(f64) -> Result<f64>,
    {
        let ends = ((lo, f(lo)?), (hi, f(hi)?));
        brent(Curve(f), ends.0, ends.1, settings)
    }

    #[test]
    fn brent_finds_sqrt_two() {
        let root = solve(|x| Ok(x * x - 2.0), 0.0, 2.0, &RootSettings::default())
            .expect("root should be found");
        assert!((root.x - 2.0_f64.sqrt()).abs() < 1e-11);
        assert!(root.iterations < 20);
    }

    #[test]
    fn brent_handles_decreasing_functions_and_flat_tails() {
        let root = solve(|x: f64| Ok((-x).exp() - 0.25), 0.0, 50.0, &RootSettings::default())
            .expect("root should be found");
        assert!((root.x - 4.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn brent_returns_exact_endpoint_roots() {
        let root = solve(|x| Ok(x - 1.0), 1.0, 3.0, &RootSettings::default()).unwrap();
        assert_eq!(root.x, 1.0);
        assert_eq!(root.iterations, 0);
    }

    #[test]
    fn brent_rejects_same_sign_bracket() {
        let err = solve(|x| Ok(x * x + 1.0), -1.0, 1.0, &RootSettings::default())
            .expect_err("no sign change");
        assert!(matches!(err, SirError::Bracketing { .. }));
        assert!(format!("{err}").contains("same sign"));
    }

    #[test]
    fn brent_reports_iteration_cap() {
        let settings = RootSettings {
            max_iterations: 2,
            ..RootSettings::default()
        };
        let err = solve(|x: f64| Ok(x.powi(3) - 0.3), 0.0, 10.0, &settings)
            .expect_err("two iterations are not enough");
        assert!(matches!(err, SirError::Fitting { iterations: 2, .. }));
    }

    #[test]
    fn brent_propagates_objective_errors() {
        let objective = |x: f64| {
            if x > 0.0 && x < 1.0 {
                Err(SirError::Integration("blew up".into()))
            } else {
                Ok(x - 0.9)
            }
        };
        let err = brent(Curve(objective), (0.0, -0.9), (1.0, 0.1), &RootSettings::default())
            .expect_err("objective failure propagates");
        assert!(matches!(err, SirError::Integration(_)));
    }

    #[test]
    fn expand_upper_grows_until_sign_change() {
        let mut calls = Vec::new();
        let (hi, f_hi) = expand_upper(
            |x| {
                calls.push(x);
                Ok(x - 20.0)
            },
            0.0,
            -20.0,
            1.0,
            3.0,
            10,
        )
        .expect("bracket should be found");
        assert_eq!(hi, 27.0);
        assert_eq!(f_hi, 7.0);
        assert_eq!(calls, vec![1.0, 3.0, 9.0, 27.0]);
    }

    #[test]
    fn expand_upper_gives_up_after_budget() {
        let err = expand_upper(|_| Ok(-1.0), 0.0, -1.0, 1.0, 10.0, 4)
            .expect_err("never crosses zero");
        match err {
            SirError::Bracketing { hi, f_hi, .. } => {
                assert_eq!(hi, 1000.0);
                assert_eq!(f_hi, -1.0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
