//! Scale calibration: bracket a monotone scale -> outcome map, then refine
//! the root with Brent's method.

use argmin::core::{CostFunction, Error};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::dynamics::{check_coupling, check_population, infected_fraction, SirSystem};
use crate::epidemic_size::{epidemic_size, EpidemicSizeSettings};
use crate::error::{Result, SirError};
use crate::roots::{brent, expand_upper, RootSettings};
use crate::solvers::{advance, OdeSettings};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Lower end of the bracket when targeting an epidemic size.
    pub lower_scale: f64,
    pub target_growth: f64,
    pub observation_growth: f64,
    pub max_expansions: usize,
    /// Initial upper bracket when no usable previous scale is known.
    pub default_scale: f64,
    pub root: RootSettings,
    pub epidemic_size: EpidemicSizeSettings,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            lower_scale: 1e-5,
            target_growth: 10.0,
            observation_growth: 3.0,
            max_expansions: 10,
            default_scale: 1.0,
            root: RootSettings::default(),
            epidemic_size: EpidemicSizeSettings {
                max_iterations: 100,
                ..EpidemicSizeSettings::default()
            },
        }
    }
}

/// Epidemic size of `scale * infectivity` relative to `target`.
struct TargetSizeProblem<'a> {
    infectivity: &'a DMatrix<f64>,
    seed: &'a [f64],
    gamma: f64,
    target: f64,
    settings: &'a EpidemicSizeSettings,
}

impl TargetSizeProblem<'_> {
    fn residual(&self, scale: f64) -> Result<f64> {
        let scaled = self.infectivity * scale;
        Ok(epidemic_size(&scaled, self.seed, self.gamma, self.settings)?.omega - self.target)
    }
}

impl CostFunction for TargetSizeProblem<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, scale: &Self::Param) -> std::result::Result<Self::Output, Error> {
        Ok(self.residual(*scale)?)
    }
}

/// Scale `x` such that the epidemic size of `x * infectivity` equals `target`.
pub fn find_scale_for_target(
    infectivity: &DMatrix<f64>,
    seed: &[f64],
    gamma: f64,
    target: f64,
    settings: &CalibrationSettings,
) -> Result<f64> {
    if !target.is_finite() {
        return Err(SirError::invalid(format!("target must be finite, got {target}")));
    }

    let problem = TargetSizeProblem {
        infectivity,
        seed,
        gamma,
        target,
        settings: &settings.epidemic_size,
    };

    let lo = settings.lower_scale;
    let f_lo = problem.residual(lo)?;
    if f_lo > 0.0 {
        return Err(SirError::Bracketing {
            lo,
            hi: lo,
            f_lo,
            f_hi: f_lo,
            message: format!("epidemic size already exceeds target {target} at the lower scale"),
        });
    }
    if f_lo == 0.0 {
        return Ok(lo);
    }

    let upper = expand_upper(
        |scale| problem.residual(scale),
        lo,
        f_lo,
        lo,
        settings.target_growth,
        settings.max_expansions,
    )?;
    let root = brent(problem, (lo, f_lo), upper, &settings.root)?;
    log::debug!(
        "Target scale {:.6e} for epidemic size {} ({} iterations).",
        root.x,
        target,
        root.iterations
    );
    Ok(root.x)
}

/// One segment of observed dynamics: integrate `state` over `days` days with
/// coupling `scale * coupling` and compare the resulting weighted fraction.
#[derive(Debug, Clone, Copy)]
pub struct ObservationProblem<'a> {
    pub state: &'a [f64],
    pub days: usize,
    pub coupling: &'a DMatrix<f64>,
    pub gamma: f64,
    pub population: &'a [f64],
}

impl ObservationProblem<'_> {
    pub fn validate(&self) -> Result<()> {
        let n = self.population.len();
        check_population(self.population, n)?;
        check_coupling(self.coupling, n)?;
        if self.state.len() != 2 * n {
            return Err(SirError::shape(format!(
                "state has {} entries, expected {}",
                self.state.len(),
                2 * n
            )));
        }
        if self.days == 0 {
            return Err(SirError::invalid("segment must span at least one day"));
        }
        Ok(())
    }

    pub fn system(&self, scale: f64) -> SirSystem<'_> {
        SirSystem::new(self.coupling, self.gamma).with_scale(scale)
    }

    /// Population-weighted infected-or-recovered fraction at the end of the segment.
    pub fn predicted_fraction(&self, scale: f64, ode: &OdeSettings) -> Result<f64> {
        let end = advance(&self.system(scale), self.state, self.days, ode)?;
        Ok(infected_fraction(&end, self.population))
    }
}

/// Segment prediction at a given scale relative to the observed fraction.
struct ObservationResidual<'a> {
    problem: &'a ObservationProblem<'a>,
    target: f64,
    ode: &'a OdeSettings,
}

impl ObservationResidual<'_> {
    fn residual(&self, scale: f64) -> Result<f64> {
        Ok(self.problem.predicted_fraction(scale, self.ode)? - self.target)
    }
}

impl CostFunction for ObservationResidual<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, scale: &Self::Param) -> std::result::Result<Self::Output, Error> {
        Ok(self.residual(*scale)?)
    }
}

/// Scale `b` for which the segment ends at the observed fraction `target`.
///
/// The bracket starts at `[0, hint]` and the upper end grows geometrically.
/// A `hint` that is not a positive finite number is replaced by
/// `settings.default_scale`.
pub fn find_scale_for_observation(
    problem: &ObservationProblem<'_>,
    target: f64,
    hint: f64,
    settings: &CalibrationSettings,
    ode: &OdeSettings,
) -> Result<f64> {
    problem.validate()?;
    if !target.is_finite() {
        return Err(SirError::invalid(format!("target must be finite, got {target}")));
    }

    let objective = ObservationResidual {
        problem,
        target,
        ode,
    };

    let lo = 0.0;
    let f_lo = objective.residual(lo)?;
    if f_lo > 0.0 {
        return Err(SirError::Bracketing {
            lo,
            hi: lo,
            f_lo,
            f_hi: f_lo,
            message: format!("observed fraction {target} is below the uncoupled prediction"),
        });
    }
    if f_lo == 0.0 {
        return Ok(lo);
    }

    let start = if hint.is_finite() && hint > 0.0 {
        hint
    } else {
        settings.default_scale
    };
    let upper = expand_upper(
        |scale| objective.residual(scale),
        lo,
        f_lo,
        start,
        settings.observation_growth,
        settings.max_expansions,
    )?;
    let root = brent(objective, (lo, f_lo), upper, &settings.root)?;
    Ok(root.x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::join_state;
    use crate::epidemic_size::infectivity_matrix;

    fn flux() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[60.0, 5.0, 2.0, 3.0, 90.0, 4.0, 1.0, 6.0, 30.0])
    }

    #[test]
    fn target_scale_reproduces_requested_size() {
        let m = infectivity_matrix(&flux()).unwrap();
        let seed = [1e-4, 1e-4, 1e-4];
        let settings = CalibrationSettings {
            epidemic_size: EpidemicSizeSettings {
                max_iterations: 2000,
                rtol_stop: 1e-12,
                strict: false,
            },
            ..CalibrationSettings::default()
        };
        let scale = find_scale_for_target(&m, &seed, 0.5, 0.4, &settings)
            .expect("calibration should succeed");
        let size = epidemic_size(&(&m * scale), &seed, 0.5, &settings.epidemic_size).unwrap();
        assert!(size.converged);
        assert!((size.omega - 0.4).abs() < 1e-8);
    }

    #[test]
    fn seed_above_target_is_a_bracketing_error() {
        let m = infectivity_matrix(&flux()).unwrap();
        let seed = [0.3, 0.3, 0.3];
        let err = find_scale_for_target(&m, &seed, 1.0, 0.1, &CalibrationSettings::default())
            .expect_err("seed already exceeds the target");
        assert!(matches!(err, SirError::Bracketing { .. }));
        assert!(format!("{err}").contains("lower scale"));
    }

    #[test]
    fn unreachable_target_exhausts_expansions() {
        let m = infectivity_matrix(&flux()).unwrap();
        let seed = [1e-3, 1e-3, 1e-3];
        let settings = CalibrationSettings {
            max_expansions: 3,
            ..CalibrationSettings::default()
        };
        let err = find_scale_for_target(&m, &seed, 1.0, 0.5, &settings)
            .expect_err("scales up to 1e-3 stay subcritical");
        match err {
            SirError::Bracketing { lo, hi, .. } => {
                assert_eq!(lo, 1e-5);
                assert!((hi - 1e-3).abs() < 1e-15, "last upper end {hi}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    fn observation_setup() -> (DMatrix<f64>, Vec<f64>, Vec<f64>) {
        let coupling = DMatrix::from_row_slice(2, 2, &[0.3, 0.05, 0.05, 0.25]);
        let state = join_state(&[0.98, 0.99], &[0.02, 0.01]);
        (coupling, state, vec![1000.0, 3000.0])
    }

    #[test]
    fn observation_scale_recovers_forward_prediction() {
        let (coupling, state, population) = observation_setup();
        let problem = ObservationProblem {
            state: &state,
            days: 7,
            coupling: &coupling,
            gamma: 0.1,
            population: &population,
        };
        let ode = OdeSettings::default();
        let target = problem.predicted_fraction(2.4, &ode).unwrap();
        let scale = find_scale_for_observation(
            &problem,
            target,
            1.0,
            &CalibrationSettings::default(),
            &ode,
        )
        .expect("scale should be found");
        assert!((scale - 2.4).abs() < 1e-6);
    }

    #[test]
    fn decreasing_observation_cannot_be_bracketed() {
        let (coupling, state, population) = observation_setup();
        let problem = ObservationProblem {
            state: &state,
            days: 3,
            coupling: &coupling,
            gamma: 0.1,
            population: &population,
        };
        let current = infected_fraction(&state, &population);
        let err = find_scale_for_observation(
            &problem,
            current - 1e-3,
            1.0,
            &CalibrationSettings::default(),
            &OdeSettings::default(),
        )
        .expect_err("observed fraction decreased");
        assert!(matches!(err, SirError::Bracketing { lo, .. } if lo == 0.0));
    }

    #[test]
    fn flat_observation_gives_zero_scale() {
        let (coupling, state, population) = observation_setup();
        let problem = ObservationProblem {
            state: &state,
            days: 2,
            coupling: &coupling,
            gamma: 0.1,
            population: &population,
        };
        let current = infected_fraction(&state, &population);
        let scale = find_scale_for_observation(
            &problem,
            current,
            0.0,
            &CalibrationSettings::default(),
            &OdeSettings::default(),
        )
        .unwrap();
        assert_eq!(scale, 0.0);
    }

    #[test]
    fn unreachable_observation_exhausts_expansions() {
        let coupling = DMatrix::from_element(2, 2, 1e-6);
        let state = join_state(&[0.98, 0.99], &[0.02, 0.01]);
        let population = [1000.0, 3000.0];
        let problem = ObservationProblem {
            state: &state,
            days: 3,
            coupling: &coupling,
            gamma: 0.1,
            population: &population,
        };
        let settings = CalibrationSettings {
            max_expansions: 2,
            ..CalibrationSettings::default()
        };
        let hint = 1.0;
        let current = infected_fraction(&state, &population);

        let err = find_scale_for_observation(
            &problem,
            current + 0.3,
            hint,
            &settings,
            &OdeSettings::default(),
        )
        .expect_err("weak coupling cannot reach the observed fraction");
        match err {
            SirError::Bracketing { lo, hi, f_hi, .. } => {
                assert_eq!(lo, 0.0);
                assert_eq!(hi, hint * 3.0);
                assert!(f_hi < 0.0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn observation_problem_validates_shapes() {
        let (coupling, state, _) = observation_setup();
        let problem = ObservationProblem {
            state: &state,
            days: 2,
            coupling: &coupling,
            gamma: 0.1,
            population: &[1.0, 2.0, 3.0],
        };
        assert!(matches!(problem.validate(), Err(SirError::Shape(_))));
    }
}
