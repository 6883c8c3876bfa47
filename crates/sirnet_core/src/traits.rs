use nalgebra::DMatrix;

/// Represents an autonomous or time-dependent flow dx/dt = f(t, x).
pub trait DynamicalSystem {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt
    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]);

    /// Jacobian ∂f/∂x at (t, x).
    fn jacobian(&self, t: f64, x: &[f64]) -> DMatrix<f64>;
}

/// Source of coupling matrices addressed by store key.
///
/// Keys are produced by [`crate::config::StoreLayout::key_for`]; the provider
/// is read-only for the duration of a run.
pub trait CouplingProvider {
    fn has_key(&self, key: &str) -> bool;

    fn get(&self, key: &str) -> Option<DMatrix<f64>>;
}
