//! The `sirnet_core` crate integrates SIR dynamics over a network of
//! communities coupled by date-indexed infectivity matrices, and fits the
//! per-segment coupling scale that reproduces observed infection data.
//!
//! Key components:
//! - **Traits**: `DynamicalSystem` (vector field + Jacobian), `CouplingProvider` (matrix lookup).
//! - **Dynamics**: the SIR vector field and its analytic Jacobian.
//! - **Epidemic size**: fixed-point final size and infectivity-matrix normalization.
//! - **Calibration**: bracket-then-Brent scale searches.
//! - **Integrate / Fit**: day-stepped trajectories and the scale-fitting loop.

pub mod calibration;
pub mod config;
pub mod dynamics;
pub mod epidemic_size;
pub mod error;
pub mod fit;
pub mod integrate;
pub mod roots;
pub mod solvers;
pub mod store;
pub mod traits;
pub mod types;

pub use calibration::{find_scale_for_observation, find_scale_for_target, CalibrationSettings};
pub use config::{FitSettings, IntegrationSettings, StalenessPolicy, StoreLayout};
pub use epidemic_size::{epidemic_size, infectivity_matrix, EpidemicSize, EpidemicSizeSettings};
pub use error::{Result, SirError};
pub use fit::fit_scales;
pub use integrate::integrate_trajectory;
pub use store::MatrixStore;
pub use types::{FitRecord, FitResult, SirState, Trajectory};
