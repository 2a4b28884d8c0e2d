//! Diffusion approximation vs Markov-chain simulation of fixation in a two-allele population.
//!
//! This binary evaluates, on a grid of initial frequencies `p` in `[0, 1]`:
//! - `P1(p)` and the mean absorption time from the diffusion approximation, using the
//!   drift matched to the chosen transition rule, `a(x) = N (P(x) - x)`, and
//!   `b(x) = x (1 - x)` (times are reported in generations, i.e. scaled by `N`).
//! - The empirical fixation probability and absorption times of `--replicates`
//!   simulated populations run until one allele is lost.
//!
//! Models
//! ------
//! - `neutral`: `P(x) = x`.
//! - `conformist3`: conformist transmission with 3 role models (`--conformity` = D).
//! - `conformist5`: conformist transmission with 5 role models (`--d3`, `--d4`).
//! - All models apply haploid selection `(1 + s) g / (1 + s g)` with `-s/--selection`.
//!
//! Usage
//! -----
//! - Run: `cargo run -- -N 100 --model conformist3 -s 0.01 --conformity 0.2 \
//!           --replicates 250 --points 50 --seed 1`
//! - Add `--trajectories-out traj.csv` to also sample fixed-horizon trajectories.
//!
//! Output
//! ------
//! - CSV (`--out`) with columns `p`, `diffusion_p1`, `simulated_p1`, `diffusion_time`,
//!   `simulated_mean_time`, `simulated_time_sd`, `absorbed`, `capped`.
//! - Optional trajectory CSV with columns `generation`, `replicate`, `frequency`.
//! - Status lines on stderr with elapsed time; `-v`/`-vv` enable library diagnostics.
//!
//! Reproducibility
//! ---------------
//! - Pass `--seed <u64>` for deterministic runs. When omitted, a random seed is used.
//! - Each grid point simulates from its own stream derived from the main seed, so the
//!   output does not depend on `--threads`.
//!
use clap::{ArgAction, Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::{Duration, Instant};
use tracing::Level;
use wf_fixation::compare::{self, ComparisonConfig};
use wf_fixation::models::{
    ConformistFive, ConformistThree, Neutral, TransitionRule, matched_drift, standard_diffusion,
};
use wf_fixation::simulation::{CapPolicy, sample_trajectories};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Model {
    Neutral,
    Conformist3,
    Conformist5,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CapMode {
    /// Drop replicates that hit the cap and continue
    Skip,
    /// Stop simulating a grid point at the first capped replicate
    Abort,
}

/// Command-line arguments for the `wf_fixation` comparison.
///
/// Only the population size (`-N`) is required.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "wf_fixation",
    about = "Fixation probability and absorption time: diffusion approximation vs simulation",
    version
)]
struct Args {
    /// Number of haploid individuals
    #[arg(short = 'N', long = "pop-size")]
    pop_size: usize,

    /// Transition rule
    #[arg(long = "model", value_enum, default_value_t = Model::Neutral)]
    model: Model,

    /// Selection coefficient favouring allele 1 (must be > -1)
    #[arg(short = 's', long = "selection", default_value_t = 0.0, allow_hyphen_values = true)]
    selection: f64,

    /// Conformity strength D for the 3-role-model rule
    #[arg(long = "conformity", default_value_t = 0.0, allow_hyphen_values = true)]
    conformity: f64,

    /// Conformity weight D3 for the 5-role-model rule
    #[arg(long = "d3", default_value_t = 0.0, allow_hyphen_values = true)]
    d3: f64,

    /// Conformity weight D4 for the 5-role-model rule
    #[arg(long = "d4", default_value_t = 0.0, allow_hyphen_values = true)]
    d4: f64,

    /// Simulated populations per initial frequency
    #[arg(long = "replicates", default_value_t = 250)]
    replicates: usize,

    /// Number of initial frequencies, equally spaced over [0,1]
    #[arg(long = "points", default_value_t = 50)]
    points: usize,

    /// Maximum generations per replicate before it is given up
    #[arg(long = "generation-cap", default_value_t = 100_000)]
    generation_cap: u64,

    /// What to do with replicates that hit the generation cap
    #[arg(long = "cap-policy", value_enum, default_value_t = CapMode::Skip)]
    cap_policy: CapMode,

    /// Output CSV file path for the comparison table
    #[arg(short = 'o', long = "out", default_value = "fixation_comparison.csv")]
    out: String,

    /// Optional output CSV file path for sampled trajectories
    #[arg(long = "trajectories-out")]
    trajectories_out: Option<String>,

    /// Generations per sampled trajectory (default 5N)
    #[arg(long = "horizon")]
    horizon: Option<usize>,

    /// Number of sampled trajectories
    #[arg(long = "trajectory-reps", default_value_t = 36)]
    trajectory_reps: usize,

    /// Initial frequency of allele 1 for sampled trajectories
    #[arg(long = "init-freq", default_value_t = 0.5)]
    init_freq: f64,

    /// Random seed (optional). If not provided, a random seed is used.
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Number of worker threads for the diffusion columns (0 = auto-detect cores)
    #[arg(long = "threads", default_value_t = 0)]
    threads: usize,

    /// Increase diagnostic output (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    validate(&args)?;
    init_tracing(args.verbose);

    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().r#gen::<u64>());

    match args.model {
        Model::Neutral => run(&Neutral, &args, seed),
        Model::Conformist3 => run(
            &ConformistThree {
                selection: args.selection,
                conformity: args.conformity,
            },
            &args,
            seed,
        ),
        Model::Conformist5 => run(
            &ConformistFive {
                selection: args.selection,
                d3: args.d3,
                d4: args.d4,
            },
            &args,
            seed,
        ),
    }
}

fn validate(args: &Args) -> Result<(), Box<dyn Error>> {
    if args.pop_size == 0 {
        return Err("--pop-size must be > 0".into());
    }
    if args.replicates == 0 {
        return Err("--replicates must be > 0".into());
    }
    if args.points == 0 {
        return Err("--points must be > 0".into());
    }
    if !(0.0..=1.0).contains(&args.init_freq) {
        return Err("--init-freq must be in [0,1]".into());
    }
    if args.selection <= -1.0 || !args.selection.is_finite() {
        return Err("--selection must be finite and > -1".into());
    }
    if ![args.conformity, args.d3, args.d4].iter().all(|v| v.is_finite()) {
        return Err("--conformity, --d3 and --d4 must be finite".into());
    }
    if args.model == Model::Neutral && args.selection != 0.0 {
        return Err("--selection requires --model conformist3 or conformist5".into());
    }
    if args.trajectories_out.is_some() && args.trajectory_reps == 0 {
        return Err("--trajectory-reps must be > 0".into());
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run<T: TransitionRule + Sync>(rule: &T, args: &Args, seed: u64) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let threads = compare::determine_threads(args.threads);
    let cap_policy = match args.cap_policy {
        CapMode::Skip => CapPolicy::SkipReplicate,
        CapMode::Abort => CapPolicy::AbortRemaining,
    };

    // Print run header with parameters
    eprintln!(
        "[{}] start | model={:?} N={} s={} reps={} points={} cap={} policy={:?} seed={} threads={} out={}",
        fmt_elapsed(start.elapsed()),
        args.model,
        args.pop_size,
        args.selection,
        args.replicates,
        args.points,
        args.generation_cap,
        args.cap_policy,
        seed,
        threads,
        &args.out
    );

    let drift = matched_drift(rule, args.pop_size);
    let config = ComparisonConfig {
        population_size: args.pop_size,
        replicates: args.replicates,
        points: args.points,
        generation_cap: args.generation_cap,
        cap_policy,
        seed,
        threads,
    };
    let rows = compare::compare(rule, &drift, &standard_diffusion, &config)?;

    let file = File::create(&args.out)?;
    let mut writer = BufWriter::new(file);
    compare::write_csv(&rows, &mut writer)?;
    writer.flush()?;

    let capped: usize = rows.iter().map(|r| r.capped).sum();
    eprintln!(
        "[{}] comparison | {} points | {} capped replicates",
        fmt_elapsed(start.elapsed()),
        rows.len(),
        capped
    );

    if let Some(path) = &args.trajectories_out {
        let horizon = args.horizon.unwrap_or(5 * args.pop_size);
        let mut rng = StdRng::seed_from_u64(seed);
        let matrix = sample_trajectories(
            rule,
            args.pop_size,
            args.trajectory_reps,
            horizon,
            args.init_freq,
            &mut rng,
        )?;
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        compare::write_trajectories_csv(&matrix, &mut writer)?;
        writer.flush()?;
        eprintln!(
            "[{}] trajectories | reps={} horizon={} out={}",
            fmt_elapsed(start.elapsed()),
            args.trajectory_reps,
            horizon,
            path
        );
    }

    eprintln!("Done. Wrote comparison to {} (seed={}).", &args.out, seed);
    Ok(())
}

fn fmt_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    let ms = d.subsec_millis();
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["wf_fixation", "-N", "20"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.model, Model::Neutral);
        assert_eq!(args.replicates, 250);
        assert_eq!(args.points, 50);
        assert_eq!(args.generation_cap, 100_000);
        assert_eq!(args.cap_policy, CapMode::Skip);
        assert!(validate(&args).is_ok());
    }

    #[test]
    fn test_validation_messages() {
        let err = validate(&parse(&["--replicates", "0"])).unwrap_err();
        assert_eq!(err.to_string(), "--replicates must be > 0");
        let err = validate(&parse(&["--init-freq", "1.5"])).unwrap_err();
        assert_eq!(err.to_string(), "--init-freq must be in [0,1]");
        let err = validate(&parse(&["--model", "conformist3", "-s", "-1"])).unwrap_err();
        assert_eq!(err.to_string(), "--selection must be finite and > -1");
        let err = validate(&parse(&["-s", "0.1"])).unwrap_err();
        assert!(err.to_string().contains("--selection requires"));
        assert!(validate(&parse(&["--model", "conformist5", "-s", "-0.2", "--d3", "0.1"])).is_ok());
    }

    #[test]
    fn test_fmt_elapsed() {
        assert_eq!(fmt_elapsed(Duration::from_millis(3_723_045)), "01:02:03.045");
    }
}
