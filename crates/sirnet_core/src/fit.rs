//! Recovers the per-segment scale sequence that reproduces observed
//! aggregate infection fractions.

use chrono::NaiveDate;
use nalgebra::DMatrix;

use crate::calibration::{find_scale_for_observation, CalibrationSettings, ObservationProblem};
use crate::config::FitSettings;
use crate::dynamics::{aggregate_fraction, check_population, infected_fraction};
use crate::error::{Result, SirError};
use crate::integrate::{check_recovery_rate, check_time_points, CouplingCursor};
use crate::solvers::{advance_days, OdeSettings};
use crate::traits::CouplingProvider;
use crate::types::{FitRecord, FitResult, SirState, Trajectory};

/// Result of fitting a single segment.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub scale: f64,
    /// Flattened states for each day of the segment, the last one being the
    /// state at the segment's end.
    pub samples: Vec<Vec<f64>>,
    /// Simulated weighted fraction at the segment's end.
    pub fraction: f64,
}

/// Fits one segment: finds the scale hitting `target`, then integrates the
/// segment again at that scale to collect its daily samples.
///
/// `hint` is the previously accepted scale; it only seeds the bracket.
pub fn fit_step(
    problem: &ObservationProblem<'_>,
    target: f64,
    hint: f64,
    calibration: &CalibrationSettings,
    ode: &OdeSettings,
) -> Result<StepOutcome> {
    let scale = find_scale_for_observation(problem, target, hint, calibration, ode)?;
    let samples = advance_days(&problem.system(scale), problem.state, problem.days, ode)?;
    let fraction = samples
        .last()
        .map(|x| infected_fraction(x, problem.population))
        .ok_or_else(|| SirError::Integration("segment produced no samples".to_string()))?;
    Ok(StepOutcome {
        scale,
        samples,
        fraction,
    })
}

/// `y` is the simulated fraction and `ypred` the observed one it was fitted to.
fn step_summary(outcome: &StepOutcome, observed: f64) -> String {
    format!(
        "b = {}, y = {}, ypred = {}, y-ypred = {:e}",
        outcome.scale,
        outcome.fraction,
        observed,
        outcome.fraction - observed
    )
}

/// Fits scales so the simulated weighted infected-or-recovered fraction
/// follows `observed` at every time point.
///
/// `observed` has one row per time point and one column per community; its
/// first row is used directly as the initial infected fractions.
pub fn fit_scales<P: CouplingProvider>(
    times: &[NaiveDate],
    observed: &DMatrix<f64>,
    gamma: f64,
    population: &[f64],
    provider: &P,
    settings: &FitSettings,
) -> Result<FitResult> {
    check_time_points(times)?;
    check_recovery_rate(gamma)?;
    let n = population.len();
    check_population(population, n)?;
    if observed.nrows() != times.len() || observed.ncols() != n {
        return Err(SirError::shape(format!(
            "observations must be {}x{}, got {}x{}",
            times.len(),
            n,
            observed.nrows(),
            observed.ncols()
        )));
    }

    let targets: Vec<f64> = observed
        .row_iter()
        .map(|row| {
            let values: Vec<f64> = row.iter().copied().collect();
            aggregate_fraction(&values, population)
        })
        .collect();

    let first_row: Vec<f64> = observed.row(0).iter().copied().collect();
    let initial = SirState::from_infected(&first_row);
    let mut x = initial.flatten();
    let mut trajectory = Trajectory::starting_at(times[0], &initial);
    let mut records = vec![FitRecord {
        date: times[0],
        scale: None,
        frac_infected_tot: infected_fraction(&x, population),
    }];

    let integration = &settings.integration;
    let mut cursor = CouplingCursor::new(provider, &integration.layout, integration.staleness, n);
    let mut hint = settings.calibration.default_scale;

    for (step, pair) in times.windows(2).enumerate() {
        let (t, t_next) = (pair[0], pair[1]);
        log::debug!("Integrating day {}", t);

        let coupling = cursor
            .refresh(t)
            .map_err(|e| SirError::at_step(step, t, e))?;
        let problem = ObservationProblem {
            state: &x,
            days: (t_next - t).num_days() as usize,
            coupling,
            gamma,
            population,
        };
        let target = targets[step + 1];
        let outcome = fit_step(&problem, target, hint, &settings.calibration, &integration.ode)
            .map_err(|e| SirError::at_step(step, t, e))?;
        log::debug!("{}", step_summary(&outcome, target));

        for (offset, sample) in outcome.samples.iter().enumerate() {
            trajectory.push_flat(t + chrono::Days::new(offset as u64 + 1), sample);
        }
        records[step].scale = Some(outcome.scale);
        records.push(FitRecord {
            date: t_next,
            scale: None,
            frac_infected_tot: outcome.fraction,
        });

        hint = outcome.scale;
        if let Some(last) = outcome.samples.into_iter().last() {
            x = last;
        }
    }

    log::info!("Fitting complete ({} segments).", times.len() - 1);
    Ok(FitResult {
        trajectory,
        records,
    })
}
