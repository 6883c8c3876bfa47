//! Day-stepped integration over a calendar of coupling matrices.

use chrono::NaiveDate;
use nalgebra::DMatrix;

use crate::config::{IntegrationSettings, StalenessPolicy, StoreLayout};
use crate::dynamics::{check_coupling, SirSystem};
use crate::error::{Result, SirError};
use crate::solvers::advance_days;
use crate::traits::CouplingProvider;
use crate::types::{SirState, Trajectory};

/// Tracks the coupling matrix in force while walking through time points.
///
/// The first refresh must find a matrix. Later refreshes either reuse the
/// previous matrix or fail, according to the staleness policy.
pub(crate) struct CouplingCursor<'a, P: CouplingProvider> {
    provider: &'a P,
    layout: &'a StoreLayout,
    policy: StalenessPolicy,
    communities: usize,
    current: Option<(NaiveDate, DMatrix<f64>)>,
}

impl<'a, P: CouplingProvider> CouplingCursor<'a, P> {
    pub(crate) fn new(
        provider: &'a P,
        layout: &'a StoreLayout,
        policy: StalenessPolicy,
        communities: usize,
    ) -> Self {
        Self {
            provider,
            layout,
            policy,
            communities,
            current: None,
        }
    }

    pub(crate) fn refresh(&mut self, date: NaiveDate) -> Result<&DMatrix<f64>> {
        let key = self.layout.key_for(date);
        let fresh = if self.provider.has_key(&key) {
            self.provider.get(&key)
        } else {
            None
        };

        match fresh {
            Some(matrix) => {
                check_coupling(&matrix, self.communities)?;
                self.current = Some((date, matrix));
            }
            None => match (&self.current, self.policy) {
                (Some((loaded, _)), StalenessPolicy::Tolerant) => {
                    log::warn!(
                        "Coupling matrix '{}' missing; reusing matrix from {}.",
                        key,
                        loaded
                    );
                }
                _ => return Err(SirError::MissingCoupling { key }),
            },
        }

        self.current
            .as_ref()
            .map(|(_, matrix)| matrix)
            .ok_or_else(|| SirError::MissingCoupling {
                key: self.layout.key_for(date),
            })
    }
}

pub(crate) fn check_time_points(times: &[NaiveDate]) -> Result<()> {
    if times.len() < 2 {
        return Err(SirError::invalid("at least two time points are required"));
    }
    for pair in times.windows(2) {
        if pair[1] <= pair[0] {
            return Err(SirError::invalid(format!(
                "time points must be strictly increasing ({} then {})",
                pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

pub(crate) fn check_recovery_rate(gamma: f64) -> Result<()> {
    if !(gamma >= 0.0) {
        return Err(SirError::invalid(format!("recovery rate must be non-negative, got {gamma}")));
    }
    Ok(())
}

/// Integrates from `initial` at `times[0]` through `times`, applying
/// `scales[k] * B(times[k])` on segment k, and samples every day.
pub fn integrate_trajectory<P: CouplingProvider>(
    initial: &SirState,
    times: &[NaiveDate],
    scales: &[f64],
    gamma: f64,
    provider: &P,
    settings: &IntegrationSettings,
) -> Result<Trajectory> {
    check_time_points(times)?;
    check_recovery_rate(gamma)?;
    if scales.len() != times.len() - 1 {
        return Err(SirError::invalid(format!(
            "scales must have {} entries, got {}",
            times.len() - 1,
            scales.len()
        )));
    }
    let n = initial.communities();
    if initial.infected.len() != n {
        return Err(SirError::shape(format!(
            "initial state has {} susceptible and {} infected entries",
            n,
            initial.infected.len()
        )));
    }

    let mut cursor = CouplingCursor::new(provider, &settings.layout, settings.staleness, n);
    let mut trajectory = Trajectory::starting_at(times[0], initial);
    let mut x = initial.flatten();

    for (step, (pair, &scale)) in times.windows(2).zip(scales).enumerate() {
        let (t, t_next) = (pair[0], pair[1]);
        log::debug!("Integrating day {}", t);

        let coupling = cursor
            .refresh(t)
            .map_err(|e| SirError::at_step(step, t, e))?;
        let days = (t_next - t).num_days() as usize;
        let system = SirSystem::new(coupling, gamma).with_scale(scale);
        let samples = advance_days(&system, &x, days, &settings.ode)
            .map_err(|e| SirError::at_step(step, t, e))?;

        for (offset, sample) in samples.iter().enumerate() {
            trajectory.push_flat(t + chrono::Days::new(offset as u64 + 1), sample);
        }
        if let Some(last) = samples.into_iter().last() {
            x = last;
        }
    }

    log::info!("Integration complete ({} days).", trajectory.len());
    Ok(trajectory)
}
