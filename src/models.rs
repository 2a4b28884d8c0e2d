//! Transition rules and drift/diffusion functions for the example models.
//!
//! A [`TransitionRule`] only sees the parental frequency `x`: it returns the probability
//! `P(x)` that an offspring carries allele 1 and every offspring is drawn independently.
//! The conformist rules bias `x` towards the majority among 3 or 5 sampled role models
//! before applying haploid selection `(1 + s) g / (1 + s g)`.

use crate::error::{Error, Result};
use crate::population::Population;
use rand::Rng;
use rand::distributions::{Bernoulli, Distribution};

/// Exchangeable transition of one generation.
pub trait TransitionRule {
    /// Probability that an offspring carries allele 1 given parental frequency `x`.
    fn transition_probability(&self, x: f64) -> f64;

    /// Draw the next generation, one Bernoulli(`P(x)`) trial per entry.
    fn next_generation<R: Rng + ?Sized>(
        &self,
        population: &Population,
        rng: &mut R,
    ) -> Result<Population> {
        let x = population.frequency();
        let p = self.transition_probability(x);
        let coin = Bernoulli::new(p).map_err(|_| Error::InvalidProbability { x, p })?;
        Ok(Population::from_draws(
            (0..population.len()).map(|_| coin.sample(rng)),
        ))
    }
}

impl<T: TransitionRule + ?Sized> TransitionRule for &T {
    fn transition_probability(&self, x: f64) -> f64 {
        (**self).transition_probability(x)
    }

    fn next_generation<R: Rng + ?Sized>(
        &self,
        population: &Population,
        rng: &mut R,
    ) -> Result<Population> {
        (**self).next_generation(population, rng)
    }
}

/// Neutral Wright–Fisher resampling: `P(x) = x`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Neutral;

impl TransitionRule for Neutral {
    fn transition_probability(&self, x: f64) -> f64 {
        x
    }
}

/// Conformist transmission with 3 role models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConformistThree {
    /// Selection coefficient `s` favouring allele 1.
    pub selection: f64,
    /// Conformity strength `D`.
    pub conformity: f64,
}

impl TransitionRule for ConformistThree {
    fn transition_probability(&self, x: f64) -> f64 {
        let g = x + self.conformity * x * (1.0 - x) * (2.0 * x - 1.0);
        haploid_selection(self.selection, g)
    }
}

/// Conformist transmission with 5 role models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConformistFive {
    pub selection: f64,
    /// Conformity weight when three of five role models agree.
    pub d3: f64,
    /// Conformity weight when four of five role models agree.
    pub d4: f64,
}

impl TransitionRule for ConformistFive {
    fn transition_probability(&self, x: f64) -> f64 {
        let bias = self.d4 - x * (1.0 - x) * (self.d4 - 2.0 * self.d3);
        let g = x + (1.0 - x) * x * (2.0 * x - 1.0) * bias;
        haploid_selection(self.selection, g)
    }
}

fn haploid_selection(s: f64, g: f64) -> f64 {
    (1.0 + s) * g / (1.0 + s * g)
}

/// Transition rule defined by an arbitrary `P(x)`.
#[derive(Debug, Clone, Copy)]
pub struct FrequencyRule<F>(pub F);

impl<F: Fn(f64) -> f64> TransitionRule for FrequencyRule<F> {
    fn transition_probability(&self, x: f64) -> f64 {
        (self.0)(x)
    }
}

/// Standard diffusion term `b(x) = x (1 - x)`.
pub fn standard_diffusion(x: f64) -> f64 {
    x * (1.0 - x)
}

/// Drift of the diploid Wright–Fisher model with selection `s` and dominance `h`,
/// `a(x) = 2Ns x (1 - x) (x + h (1 - 2x))`.
pub fn wf_selection_drift(population_size: usize, s: f64, h: f64) -> impl Fn(f64) -> f64 + Copy {
    let alpha = 2.0 * population_size as f64 * s;
    move |x| alpha * x * (1.0 - x) * (x + h * (1.0 - 2.0 * x))
}

/// Drift matching the expected one-generation change of `rule`, `a(x) = N (P(x) - x)`.
///
/// Paired with [`standard_diffusion`] this measures time in units of `N` generations.
pub fn matched_drift<T: TransitionRule>(
    rule: &T,
    population_size: usize,
) -> impl Fn(f64) -> f64 + '_ {
    let n = population_size as f64;
    move |x| n * (rule.transition_probability(x) - x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_rules_fix_boundaries() {
        let three = ConformistThree {
            selection: 0.1,
            conformity: 0.4,
        };
        let five = ConformistFive {
            selection: -0.05,
            d3: 0.2,
            d4: 0.3,
        };
        for p in [0.0, 1.0] {
            assert_eq!(Neutral.transition_probability(p), p);
            assert!((three.transition_probability(p) - p).abs() < 1e-15);
            assert!((five.transition_probability(p) - p).abs() < 1e-15);
        }
    }

    #[test]
    fn test_conformity_without_selection_is_symmetric() {
        let rule = ConformistThree {
            selection: 0.0,
            conformity: 0.5,
        };
        assert!((rule.transition_probability(0.5) - 0.5).abs() < 1e-15);
        // majority allele is amplified
        assert!(rule.transition_probability(0.7) > 0.7);
        assert!(rule.transition_probability(0.3) < 0.3);
        let x = 0.2;
        let sum = rule.transition_probability(x) + rule.transition_probability(1.0 - x);
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_five_role_models_reduce_to_three() {
        // With d4 = 2 d3 the bias term is constant and matches the three-model rule.
        let five = ConformistFive {
            selection: 0.02,
            d3: 0.15,
            d4: 0.3,
        };
        let three = ConformistThree {
            selection: 0.02,
            conformity: 0.3,
        };
        for i in 0..=10 {
            let x = i as f64 / 10.0;
            let diff = five.transition_probability(x) - three.transition_probability(x);
            assert!(diff.abs() < 1e-12);
        }
    }

    #[test]
    fn test_next_generation_preserves_size() {
        let mut rng = StdRng::seed_from_u64(11);
        let pop = Population::with_ones(25, 10).unwrap();
        let next = Neutral.next_generation(&pop, &mut rng).unwrap();
        assert_eq!(next.len(), 25);
        assert!(next.alleles().iter().all(|&a| a <= 1));
    }

    #[test]
    fn test_next_generation_absorbing_states_stay() {
        let mut rng = StdRng::seed_from_u64(12);
        let rule = ConformistThree {
            selection: 0.3,
            conformity: 0.2,
        };
        let lost = Population::with_ones(8, 0).unwrap();
        let fixed = Population::with_ones(8, 8).unwrap();
        for _ in 0..20 {
            assert_eq!(rule.next_generation(&lost, &mut rng).unwrap().ones(), 0);
            assert_eq!(rule.next_generation(&fixed, &mut rng).unwrap().ones(), 8);
        }
    }

    #[test]
    fn test_invalid_probability_is_reported() {
        let mut rng = StdRng::seed_from_u64(13);
        let pop = Population::with_ones(4, 2).unwrap();
        let err = FrequencyRule(|x: f64| 2.0 * x + 0.5)
            .next_generation(&pop, &mut rng)
            .unwrap_err();
        assert_eq!(err, Error::InvalidProbability { x: 0.5, p: 1.5 });
    }

    #[test]
    fn test_wf_selection_drift_shape() {
        let a = wf_selection_drift(10, 0.05, 0.5);
        assert_eq!(a(0.0), 0.0);
        assert_eq!(a(1.0), 0.0);
        assert!((a(0.5) - 0.125).abs() < 1e-15);
        let recessive = wf_selection_drift(10, 0.05, 0.0);
        assert!(recessive(0.1) < a(0.1));
    }

    #[test]
    fn test_matched_drift() {
        assert_eq!(matched_drift(&Neutral, 100)(0.3), 0.0);
        let rule = ConformistThree {
            selection: 0.01,
            conformity: 0.0,
        };
        let a = matched_drift(&rule, 50);
        let x = 0.4;
        let expected = 50.0 * (1.01 * x / (1.0 + 0.01 * x) - x);
        assert!((a(x) - expected).abs() < 1e-12);
    }
}
