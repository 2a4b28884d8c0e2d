//! Diffusion approximation of fixation probabilities and mean absorption time.
//!
//! For a diffusion on `[0, 1]` with drift `a(x)` and variance `b(x)`, define the
//! potential
//!
//! ```text
//! psi(y) = exp(-2 ∫_0^y a(x)/b(x) dx),   psi(1) = 0
//! ```
//!
//! Then `P1(p) = ∫_0^p psi / ∫_0^1 psi`, `P0(p) = 1 - P1(p)` and the mean time to
//! absorption is `∫_0^1 t(x) dx` with the sojourn density
//!
//! ```text
//! t(x) = 2 P0(p) ∫_0^x psi / (b(x) psi(x))   for x <= p
//! t(x) = 2 P1(p) ∫_x^1 psi / (b(x) psi(x))   for x >  p
//! ```
//!
//! Every integral is an independent adaptive quadrature, so the absorption time is a
//! three-level nested integral. With `b(x) = x(1 - x)` the time unit is `N`
//! generations of a haploid population of size `N`.

use crate::error::{Error, Result};
use crate::quadrature::Quadrature;
use tracing::debug;

/// Drift/diffusion pair together with the quadrature settings used to evaluate it.
#[derive(Debug, Clone)]
pub struct DiffusionApproximation<A, B> {
    drift: A,
    diffusion: B,
    quadrature: Quadrature,
}

impl<A, B> DiffusionApproximation<A, B>
where
    A: Fn(f64) -> f64,
    B: Fn(f64) -> f64,
{
    pub fn new(drift: A, diffusion: B) -> Self {
        Self {
            drift,
            diffusion,
            quadrature: Quadrature::default(),
        }
    }

    /// Replace the default tolerances (`1.49e-8`, 50 subintervals).
    pub fn with_quadrature(mut self, quadrature: Quadrature) -> Self {
        self.quadrature = quadrature;
        self
    }

    pub fn quadrature(&self) -> &Quadrature {
        &self.quadrature
    }

    fn drift_at(&self, x: f64) -> Result<f64> {
        let value = (self.drift)(x);
        if !value.is_finite() {
            return Err(Error::NonFinite {
                name: "drift",
                x,
                value,
            });
        }
        Ok(value)
    }

    fn diffusion_at(&self, x: f64) -> Result<f64> {
        let value = (self.diffusion)(x);
        if !value.is_finite() {
            return Err(Error::NonFinite {
                name: "diffusion",
                x,
                value,
            });
        }
        if value < 0.0 {
            return Err(Error::NegativeDiffusion { x, value });
        }
        Ok(value)
    }

    /// `a(x) / b(x)`, taken as zero wherever `b(x) = 0`.
    pub fn integrand(&self, x: f64) -> Result<f64> {
        let b = self.diffusion_at(x)?;
        if b == 0.0 {
            return Ok(0.0);
        }
        Ok(self.drift_at(x)? / b)
    }

    /// Potential function. `psi(1)` is defined as zero rather than evaluated.
    pub fn psi(&self, y: f64) -> Result<f64> {
        if y == 1.0 {
            return Ok(0.0);
        }
        let power = self
            .quadrature
            .integrate(|x| self.integrand(x), 0.0, y)?
            .value;
        let value = (-2.0 * power).exp();
        if !value.is_finite() {
            return Err(Error::NonFinite {
                name: "psi",
                x: y,
                value,
            });
        }
        Ok(value)
    }

    fn psi_integral(&self, lower: f64, upper: f64) -> Result<f64> {
        Ok(self
            .quadrature
            .integrate(|y| self.psi(y), lower, upper)?
            .value)
    }

    fn normalization(&self) -> Result<f64> {
        let total = self.psi_integral(0.0, 1.0)?;
        if total == 0.0 || !total.is_finite() {
            return Err(Error::DegenerateNormalization(total));
        }
        Ok(total)
    }

    /// Probability that a population starting at frequency `p` loses allele 1.
    pub fn fixation_probability_to_zero(&self, p: f64) -> Result<f64> {
        check_frequency(p)?;
        let total = self.normalization()?;
        Ok(self.psi_integral(p, 1.0)? / total)
    }

    /// Probability that a population starting at frequency `p` fixes allele 1.
    pub fn fixation_probability_to_one(&self, p: f64) -> Result<f64> {
        check_frequency(p)?;
        let total = self.normalization()?;
        Ok(self.psi_integral(0.0, p)? / total)
    }

    /// Expected time until either boundary is hit, starting from `p`.
    ///
    /// `∫_0^1 psi` and both fixation probabilities are computed once per call.
    /// The outer integral is split at `p`, where the sojourn density has a kink.
    pub fn mean_absorption_time(&self, p: f64) -> Result<f64> {
        check_frequency(p)?;
        let total = self.normalization()?;
        let to_zero = self.psi_integral(p, 1.0)? / total;
        let to_one = self.psi_integral(0.0, p)? / total;

        let below = self.quadrature.integrate(
            |x| self.sojourn_density(x, p, to_zero, to_one),
            0.0,
            p,
        )?;
        let above = self.quadrature.integrate(
            |x| self.sojourn_density(x, p, to_zero, to_one),
            p,
            1.0,
        )?;
        let time = below.value + above.value;
        debug!(
            p,
            time,
            evaluations = below.evaluations + above.evaluations,
            abs_error = below.abs_error + above.abs_error,
            "mean absorption time"
        );
        Ok(time)
    }

    fn sojourn_density(&self, x: f64, p: f64, to_zero: f64, to_one: f64) -> Result<f64> {
        let scale = self.diffusion_at(x)? * self.psi(x)?;
        if scale == 0.0 {
            return Ok(0.0);
        }
        let (weight, partial) = if x <= p {
            (to_zero, self.psi_integral(0.0, x)?)
        } else {
            (to_one, self.psi_integral(x, 1.0)?)
        };
        Ok(2.0 * weight * partial / scale)
    }
}

fn check_frequency(p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::InvalidFrequency(p));
    }
    Ok(())
}

/// `P0(p)` with default quadrature settings.
pub fn fixation_probability_to_zero<A, B>(p: f64, a: A, b: B) -> Result<f64>
where
    A: Fn(f64) -> f64,
    B: Fn(f64) -> f64,
{
    DiffusionApproximation::new(a, b).fixation_probability_to_zero(p)
}

/// `P1(p)` with default quadrature settings.
pub fn fixation_probability_to_one<A, B>(p: f64, a: A, b: B) -> Result<f64>
where
    A: Fn(f64) -> f64,
    B: Fn(f64) -> f64,
{
    DiffusionApproximation::new(a, b).fixation_probability_to_one(p)
}

/// Mean absorption time `t̄(p)` with default quadrature settings.
pub fn mean_absorption_time<A, B>(p: f64, a: A, b: B) -> Result<f64>
where
    A: Fn(f64) -> f64,
    B: Fn(f64) -> f64,
{
    DiffusionApproximation::new(a, b).mean_absorption_time(p)
}
