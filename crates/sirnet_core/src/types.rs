//! Result containers shared by the trajectory integrator and the fit engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dynamics::{join_state, split_state};

/// Susceptible and infected fractions, one entry per community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SirState {
    pub susceptible: Vec<f64>,
    pub infected: Vec<f64>,
}

impl SirState {
    /// Initial condition where everyone not infected is still susceptible.
    pub fn from_infected(infected: &[f64]) -> Self {
        Self {
            susceptible: infected.iter().map(|i| 1.0 - i).collect(),
            infected: infected.to_vec(),
        }
    }

    pub fn from_flat(x: &[f64], n: usize) -> Self {
        let (s, i) = split_state(x, n);
        Self {
            susceptible: s.to_vec(),
            infected: i.to_vec(),
        }
    }

    pub fn communities(&self) -> usize {
        self.susceptible.len()
    }

    pub fn flatten(&self) -> Vec<f64> {
        join_state(&self.susceptible, &self.infected)
    }
}

/// Daily (S, I) snapshots; row `k` of each table belongs to `dates[k]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub dates: Vec<NaiveDate>,
    pub susceptible: Vec<Vec<f64>>,
    pub infected: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn starting_at(date: NaiveDate, state: &SirState) -> Self {
        Self {
            dates: vec![date],
            susceptible: vec![state.susceptible.clone()],
            infected: vec![state.infected.clone()],
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub(crate) fn push_flat(&mut self, date: NaiveDate, x: &[f64]) {
        let n = x.len() / 2;
        let (s, i) = split_state(x, n);
        self.dates.push(date);
        self.susceptible.push(s.to_vec());
        self.infected.push(i.to_vec());
    }

    pub fn state(&self, index: usize) -> Option<SirState> {
        Some(SirState {
            susceptible: self.susceptible.get(index)?.clone(),
            infected: self.infected.get(index)?.clone(),
        })
    }

    pub fn state_at(&self, date: NaiveDate) -> Option<SirState> {
        let index = self.dates.iter().position(|d| *d == date)?;
        self.state(index)
    }

    pub fn last_state(&self) -> Option<SirState> {
        self.state(self.len().checked_sub(1)?)
    }
}

/// One row of the fit-quality table, indexed by the input time points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRecord {
    pub date: NaiveDate,
    /// Scale applied on the segment starting at `date`; `None` for the last point.
    pub scale: Option<f64>,
    /// Simulated population-weighted infected-or-recovered fraction.
    pub frac_infected_tot: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub trajectory: Trajectory,
    pub records: Vec<FitRecord>,
}

impl FitResult {
    /// Fitted scales of every segment, without the trailing undefined entry.
    pub fn scales(&self) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.scale).collect()
    }
}
