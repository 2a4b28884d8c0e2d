//! Side-by-side evaluation of both routes over a grid of initial frequencies.
//!
//! Diffusion quantities are pure, so they are spread over worker threads; each worker
//! handles a contiguous chunk of the grid. Simulations run sequentially, one seeded
//! stream per grid point derived from the top-level seed.

use crate::diffusion::DiffusionApproximation;
use crate::error::{Error, Result};
use crate::models::TransitionRule;
use crate::simulation::{
    AbsorptionConfig, CapPolicy, DEFAULT_GENERATION_CAP, simulate_until_absorption_seeded,
};
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::sync::mpsc;
use std::thread;
use tracing::{debug, warn};

/// Grid and simulation settings for [`compare`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonConfig {
    pub population_size: usize,
    /// Replicates simulated per grid point.
    pub replicates: usize,
    /// Number of equally spaced initial frequencies in `[0, 1]`.
    pub points: usize,
    pub generation_cap: u64,
    pub cap_policy: CapPolicy,
    pub seed: u64,
    /// Worker threads for the diffusion columns (0 = available parallelism).
    pub threads: usize,
}

impl ComparisonConfig {
    pub fn new(population_size: usize, seed: u64) -> Self {
        Self {
            population_size,
            replicates: 250,
            points: 50,
            generation_cap: DEFAULT_GENERATION_CAP,
            cap_policy: CapPolicy::default(),
            seed,
            threads: 0,
        }
    }
}

/// One grid point. Diffusion times are scaled by `N` to generations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonRow {
    pub p: f64,
    pub diffusion_p1: f64,
    pub simulated_p1: f64,
    pub diffusion_time: f64,
    pub simulated_mean_time: f64,
    pub simulated_time_sd: f64,
    pub absorbed: usize,
    pub capped: usize,
}

/// `points` equally spaced values from 0 to 1 inclusive.
pub fn frequency_grid(points: usize) -> Vec<f64> {
    match points {
        0 => vec![],
        1 => vec![0.0],
        _ => (0..points)
            .map(|i| i as f64 / (points - 1) as f64)
            .collect(),
    }
}

/// Seed for the simulations at grid index `index`.
pub fn point_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64).wrapping_mul(0x9E37_79B9)
}

/// Resolve the number of worker threads to use given a requested value.
///
/// - `0` selects `std::thread::available_parallelism()`.
/// - `>=1` uses the requested value.
pub fn determine_threads(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Compute the sample mean and population variance of a slice.
pub fn mean_var(xs: &[f64]) -> (f64, f64) {
    let n = xs.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = xs.iter().sum::<f64>() / n as f64;
    let var = xs.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;
    (mean, var)
}

fn diffusion_point<A, B>(a: &A, b: &B, p: f64, population_size: usize) -> Result<(f64, f64)>
where
    A: Fn(f64) -> f64,
    B: Fn(f64) -> f64,
{
    let d = DiffusionApproximation::new(a, b);
    let p1 = d.fixation_probability_to_one(p)?;
    let time = population_size as f64 * d.mean_absorption_time(p)?;
    Ok((p1, time))
}

/// `(P1(p), N t̄(p))` for every grid value, computed on `threads` workers.
pub fn diffusion_columns<A, B>(
    a: &A,
    b: &B,
    grid: &[f64],
    population_size: usize,
    threads: usize,
) -> Result<Vec<(f64, f64)>>
where
    A: Fn(f64) -> f64 + Sync,
    B: Fn(f64) -> f64 + Sync,
{
    if threads <= 1 || grid.len() <= 1 {
        return grid
            .iter()
            .map(|&p| diffusion_point(a, b, p, population_size))
            .collect();
    }

    let chunk = grid.len().div_ceil(threads);
    let (tx, rx) = mpsc::channel();
    thread::scope(|scope| {
        for (t, part) in grid.chunks(chunk).enumerate() {
            let tx = tx.clone();
            scope.spawn(move || {
                let values: Result<Vec<(f64, f64)>> = part
                    .iter()
                    .map(|&p| diffusion_point(a, b, p, population_size))
                    .collect();
                let _ = tx.send((t * chunk, values));
            });
        }
    });
    drop(tx);

    let mut out = vec![(0.0, 0.0); grid.len()];
    for (start, part) in rx.iter() {
        let part = part?;
        out[start..start + part.len()].copy_from_slice(&part);
    }
    Ok(out)
}

/// Evaluate diffusion and simulation at every grid point.
///
/// A grid point where no replicate absorbs gets `NaN` simulation columns instead of
/// failing the whole comparison.
pub fn compare<T, A, B>(
    rule: &T,
    a: &A,
    b: &B,
    config: &ComparisonConfig,
) -> Result<Vec<ComparisonRow>>
where
    T: TransitionRule,
    A: Fn(f64) -> f64 + Sync,
    B: Fn(f64) -> f64 + Sync,
{
    if config.points == 0 {
        return Err(Error::InvalidParameter("points must be > 0".into()));
    }
    let grid = frequency_grid(config.points);
    let threads = determine_threads(config.threads);
    let theory = diffusion_columns(a, b, &grid, config.population_size, threads)?;
    debug!(points = grid.len(), threads, "diffusion columns done");

    let mut rows = Vec::with_capacity(grid.len());
    for (i, (&p, (diffusion_p1, diffusion_time))) in grid.iter().zip(theory).enumerate() {
        let sim_config = AbsorptionConfig::new(config.replicates, config.population_size, p)
            .with_generation_cap(config.generation_cap)
            .with_cap_policy(config.cap_policy);
        let row = match simulate_until_absorption_seeded(
            rule,
            &sim_config,
            point_seed(config.seed, i),
        ) {
            Ok(summary) => {
                let counts: Vec<f64> = summary
                    .generation_counts()
                    .into_iter()
                    .map(|g| g as f64)
                    .collect();
                let (mean, var) = mean_var(&counts);
                ComparisonRow {
                    p,
                    diffusion_p1,
                    simulated_p1: summary.fixation_probability(),
                    diffusion_time,
                    simulated_mean_time: mean,
                    simulated_time_sd: var.sqrt(),
                    absorbed: counts.len(),
                    capped: summary.capped(),
                }
            }
            Err(Error::CapExceeded { attempted, .. }) => {
                warn!(p, attempted, "no replicate absorbed at this grid point");
                ComparisonRow {
                    p,
                    diffusion_p1,
                    simulated_p1: f64::NAN,
                    diffusion_time,
                    simulated_mean_time: f64::NAN,
                    simulated_time_sd: f64::NAN,
                    absorbed: 0,
                    capped: attempted,
                }
            }
            Err(e) => return Err(e),
        };
        rows.push(row);
    }
    Ok(rows)
}

/// Write comparison rows as CSV with a header line.
pub fn write_csv<W: Write>(rows: &[ComparisonRow], writer: &mut W) -> io::Result<()> {
    writeln!(
        writer,
        "p,diffusion_p1,simulated_p1,diffusion_time,simulated_mean_time,simulated_time_sd,absorbed,capped"
    )?;
    for r in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{}",
            r.p,
            r.diffusion_p1,
            r.simulated_p1,
            r.diffusion_time,
            r.simulated_mean_time,
            r.simulated_time_sd,
            r.absorbed,
            r.capped
        )?;
    }
    Ok(())
}

/// Write a `[generation][replicate]` matrix as `generation,replicate,frequency` rows.
///
/// Generations are numbered from 1, the first sampled step.
pub fn write_trajectories_csv<W: Write>(matrix: &[Vec<f64>], writer: &mut W) -> io::Result<()> {
    writeln!(writer, "generation,replicate,frequency")?;
    for (g, row) in matrix.iter().enumerate() {
        for (r, freq) in row.iter().enumerate() {
            writeln!(writer, "{},{r},{freq}", g + 1)?;
        }
    }
    Ok(())
}
