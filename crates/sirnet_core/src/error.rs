//! Error types shared by the integration and fitting routines.

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SirError>;

#[derive(Debug, Error)]
pub enum SirError {
    /// Matrix or vector dimensions do not agree.
    #[error("shape error: {0}")]
    Shape(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No sign change of the objective could be established.
    #[error("bracketing failed: {message} (lo = {lo:e}, hi = {hi:e}, f(lo) = {f_lo:e}, f(hi) = {f_hi:e})")]
    Bracketing {
        lo: f64,
        hi: f64,
        f_lo: f64,
        f_hi: f64,
        message: String,
    },

    /// The root finder exhausted its iteration budget.
    #[error("root finding did not converge after {iterations} iterations: {message}")]
    Fitting { iterations: usize, message: String },

    #[error("integration failed: {0}")]
    Integration(String),

    /// Epidemic-size iteration ran out of iterations in strict mode.
    #[error("epidemic size did not converge in {iterations} iterations (rtol = {rtol:e})")]
    Convergence { iterations: usize, rtol: f64 },

    #[error("no coupling matrix stored under key '{key}'")]
    MissingCoupling { key: String },

    #[error("step {step} ({date}): {source}")]
    AtStep {
        step: usize,
        date: NaiveDate,
        #[source]
        source: Box<SirError>,
    },
}

impl SirError {
    pub(crate) fn shape(message: impl Into<String>) -> Self {
        SirError::Shape(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SirError::InvalidInput(message.into())
    }

    pub(crate) fn at_step(step: usize, date: NaiveDate, source: SirError) -> Self {
        SirError::AtStep {
            step,
            date,
            source: Box::new(source),
        }
    }

    /// Strips any step annotations and returns the underlying failure.
    pub fn root_cause(&self) -> &SirError {
        match self {
            SirError::AtStep { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_nested_steps() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let inner = SirError::Integration("boom".into());
        let err = SirError::at_step(2, date, SirError::at_step(1, date, inner));
        assert!(matches!(err.root_cause(), SirError::Integration(_)));
        let message = format!("{err}");
        assert!(message.contains("step 2 (2020-03-01)"));
        assert!(message.contains("boom"));
    }
}
