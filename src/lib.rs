//! Fixation probabilities and absorption times for a two-allele population.
//!
//! A haploid population of fixed size `N` evolves in non-overlapping generations: every
//! offspring independently carries allele 1 with a probability `P(x)` that depends only
//! on the parental frequency `x`. The chain is absorbed when one allele is lost. This
//! crate computes the probability of fixing each allele and the expected time until
//! absorption by two routes:
//!
//! - [`diffusion`]: the diffusion approximation with drift `a(x)` and variance `b(x)`,
//!   evaluated by nested adaptive quadrature ([`quadrature`]).
//! - [`simulation`]: Monte Carlo replicates of the discrete chain, run until absorption
//!   or a generation cap.
//!
//! Models
//! ------
//! - Drift and diffusion are plain `Fn(f64) -> f64` values on `[0, 1]`.
//! - Transition rules implement [`TransitionRule`]. [`models`] ships neutral
//!   Wright–Fisher resampling and conformist transmission with 3 or 5 role models;
//!   [`matched_drift`] turns a rule into the drift with the same expected change.
//!
//! Reproducibility
//! ---------------
//! - Simulations take a caller-owned `Rng`; replicates advance the same stream in order.
//! - The `_seeded` entry points seed a `StdRng` once per call, so equal seeds give equal
//!   results.
//!
//! Example
//! -------
//! ```
//! use wf_fixation::{AbsorptionConfig, Neutral, fixation_probability_to_one, standard_diffusion};
//! use wf_fixation::simulation::simulate_until_absorption_seeded;
//!
//! let p1 = fixation_probability_to_one(0.3, |_| 0.0, standard_diffusion).unwrap();
//! assert!((p1 - 0.3).abs() < 1e-9);
//!
//! let config = AbsorptionConfig::new(100, 10, 0.3);
//! let summary = simulate_until_absorption_seeded(&Neutral, &config, 42).unwrap();
//! assert_eq!(summary.generation_counts().len(), 100);
//! ```

pub mod compare;
pub mod diffusion;
pub mod error;
pub mod models;
pub mod population;
pub mod quadrature;
pub mod simulation;

pub use diffusion::{
    DiffusionApproximation, fixation_probability_to_one, fixation_probability_to_zero,
    mean_absorption_time,
};
pub use error::{Error, Result};
pub use models::{
    ConformistFive, ConformistThree, FrequencyRule, Neutral, TransitionRule, matched_drift,
    standard_diffusion, wf_selection_drift,
};
pub use population::Population;
pub use quadrature::{Quadrature, QuadratureResult};
pub use simulation::{
    AbsorptionConfig, AbsorptionRecord, AbsorptionSummary, CapPolicy, sample_trajectories,
    simulate_until_absorption,
};
