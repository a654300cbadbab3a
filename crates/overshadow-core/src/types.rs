//! Core types for the overshadowing signal chain
//!
//! Samples flowing through the graph are either raw bytes (packed data,
//! or bit streams constrained to {0, 1}) or complex baseband values.
//! All complex arithmetic uses `num_complex::Complex64`.

use num_complex::Complex64;

/// Type alias for complex baseband samples using f64 precision
pub type Complex = Complex64;

/// A buffer of complex baseband samples
pub type IqBuffer = Vec<Complex>;

/// Raw bits as a vector of bytes (one bit per byte, value 0 or 1)
pub type BitStream = Vec<u8>;

/// Result type for signal-chain operations
pub type DspResult<T> = Result<T, DspError>;

/// Errors that can occur while configuring or running a signal chain
#[derive(Debug, thiserror::Error)]
pub enum DspError {
    /// A configuration value violates an invariant. Raised before any
    /// sample flows; never silently clamped.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A source or sink could not be opened, read or written.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The flowgraph wiring is inconsistent (type mismatch, dangling
    /// port, cycle). Raised at validation time, before the run starts.
    #[error("graph error: {0}")]
    Graph(String),
}

impl DspError {
    /// Shorthand for an `InvalidParameter` with a formatted message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        DspError::InvalidParameter(msg.into())
    }
}

/// Helper functions for working with complex sample buffers
pub mod complex_ops {
    use super::*;

    /// Compute the average power of a signal
    pub fn average_power(samples: &[Complex]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|s| s.norm_sqr()).sum::<f64>() / samples.len() as f64
    }

    /// Peak magnitude of a signal
    pub fn peak_magnitude(samples: &[Complex]) -> f64 {
        samples.iter().map(|s| s.norm()).fold(0.0_f64, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_average_power_unit_circle() {
        let samples = vec![
            Complex::new(1.0, 0.0),
            Complex::new(0.0, 1.0),
            Complex::new(-1.0, 0.0),
            Complex::new(0.0, -1.0),
        ];
        assert_relative_eq!(complex_ops::average_power(&samples), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_average_power_empty() {
        assert_eq!(complex_ops::average_power(&[]), 0.0);
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = DspError::invalid("delay must be non-negative");
        assert!(err.to_string().contains("delay must be non-negative"));
    }
}
