//! Finite two-allele population.

use crate::error::{Error, Result};

/// A fixed-length population of binary allele states (`1` = allele A, `0` = allele B).
///
/// The count of `1` entries is tracked alongside the states, so the frequency is an
/// exact ratio and the absorbing states compare equal to `0.0` and `1.0` exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Population {
    alleles: Vec<u8>,
    ones: usize,
}

impl Population {
    /// Build a population from explicit allele states.
    pub fn from_alleles(alleles: Vec<u8>) -> Result<Self> {
        if alleles.is_empty() {
            return Err(Error::InvalidParameter("population must not be empty".into()));
        }
        if let Some(&bad) = alleles.iter().find(|&&a| a > 1) {
            return Err(Error::InvalidAllele(bad));
        }
        let ones = alleles.iter().filter(|&&a| a == 1).count();
        Ok(Self { alleles, ones })
    }

    /// `ones` copies of allele 1 followed by `size - ones` copies of allele 0.
    pub fn with_ones(size: usize, ones: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidParameter("population size must be > 0".into()));
        }
        if ones > size {
            return Err(Error::InvalidParameter(format!(
                "cannot place {ones} copies of allele 1 in a population of {size}"
            )));
        }
        let mut alleles = vec![0u8; size];
        alleles[..ones].fill(1);
        Ok(Self { alleles, ones })
    }

    /// Initial population with `round(size * p)` copies of allele 1.
    ///
    /// Ties round to even (`0.5 -> 0`, `1.5 -> 2`), so the realized frequency can differ
    /// slightly from `p` when `size * p` is not an integer.
    pub fn from_frequency(size: usize, p: f64) -> Result<Self> {
        check_frequency(p)?;
        let ones = (size as f64 * p).round_ties_even() as usize;
        Self::with_ones(size, ones.min(size))
    }

    /// Initial population with `floor(size * p)` copies of allele 1.
    pub fn from_frequency_floor(size: usize, p: f64) -> Result<Self> {
        check_frequency(p)?;
        let ones = (size as f64 * p).floor() as usize;
        Self::with_ones(size, ones.min(size))
    }

    /// Collect Bernoulli draws into a population.
    pub(crate) fn from_draws<I: IntoIterator<Item = bool>>(draws: I) -> Self {
        let alleles: Vec<u8> = draws.into_iter().map(u8::from).collect();
        let ones = alleles.iter().filter(|&&a| a == 1).count();
        Self { alleles, ones }
    }

    pub fn len(&self) -> usize {
        self.alleles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alleles.is_empty()
    }

    pub fn alleles(&self) -> &[u8] {
        &self.alleles
    }

    /// Number of copies of allele 1.
    pub fn ones(&self) -> usize {
        self.ones
    }

    /// Frequency of allele 1.
    pub fn frequency(&self) -> f64 {
        self.ones as f64 / self.alleles.len() as f64
    }

    /// True when a single allele remains.
    pub fn is_fixed(&self) -> bool {
        self.ones == 0 || self.ones == self.alleles.len()
    }
}

fn check_frequency(p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::InvalidFrequency(p));
    }
    Ok(())
}
