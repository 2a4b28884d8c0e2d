use thiserror::Error;

/// Errors produced by the diffusion engine and the absorption simulator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// An initial frequency outside `[0, 1]`.
    #[error("Frequency {0} is outside [0, 1]")]
    InvalidFrequency(f64),

    /// A caller-supplied function returned NaN or an infinity.
    #[error("{name} returned non-finite value {value} at x = {x}")]
    NonFinite {
        name: &'static str,
        x: f64,
        value: f64,
    },

    /// The diffusion function must be non-negative on `[0, 1]`.
    #[error("Diffusion function is negative at x = {x}: {value}")]
    NegativeDiffusion { x: f64, value: f64 },

    /// `∫_0^1 psi` vanished or overflowed, so fixation probabilities are undefined.
    #[error("Potential function normalization is degenerate: {0}")]
    DegenerateNormalization(f64),

    /// A transition rule produced a probability outside `[0, 1]`.
    #[error("Transition probability {p} at frequency {x} is outside [0, 1]")]
    InvalidProbability { x: f64, p: f64 },

    /// A transition rule changed the population size.
    #[error("Transition changed population size from {expected} to {found}")]
    PopulationSizeMismatch { expected: usize, found: usize },

    /// A population entry other than 0 or 1.
    #[error("Invalid allele state {0} (must be 0 or 1)")]
    InvalidAllele(u8),

    /// Invalid configuration value.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Adaptive quadrature ran out of subdivisions before meeting its tolerance.
    #[error(
        "Integration over [{lower}, {upper}] did not converge after {subdivisions} subdivisions (error estimate {abs_error:e})"
    )]
    Integration {
        lower: f64,
        upper: f64,
        abs_error: f64,
        subdivisions: usize,
    },

    /// Every attempted replicate hit the generation cap.
    #[error("No replicate absorbed within {cap} generations ({attempted} attempted)")]
    CapExceeded { cap: u64, attempted: usize },
}

impl Error {
    /// True for errors caused by inputs violating their preconditions.
    pub fn is_domain_error(&self) -> bool {
        !matches!(self, Self::Integration { .. } | Self::CapExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
