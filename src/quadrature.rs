//! Globally adaptive Gauss–Kronrod quadrature.
//!
//! Each subinterval is estimated with the 21-point Kronrod rule and its embedded
//! 10-point Gauss rule; the subinterval with the largest error estimate is bisected
//! until the summed estimate meets `max(epsabs, epsrel * |value|)` or the
//! subdivision limit is reached. Defaults match the classic QUADPACK `qag` driver
//! as exposed by most numerical libraries (`epsabs = epsrel = 1.49e-8`, 50 intervals).
//!
//! Integrands return `Result<f64>` so that failures inside nested integrals
//! propagate to the outermost caller unchanged.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub const DEFAULT_EPSABS: f64 = 1.49e-8;
pub const DEFAULT_EPSREL: f64 = 1.49e-8;
pub const DEFAULT_LIMIT: usize = 50;

// Kronrod abscissae on [0, 1]; odd indices are the 10-point Gauss nodes.
const XGK: [f64; 11] = [
    0.995_657_163_025_808_080_735_527_280_689_003,
    0.973_906_528_517_171_720_077_964_012_084_452,
    0.930_157_491_355_708_226_001_207_180_059_508,
    0.865_063_366_688_984_510_732_096_688_423_493,
    0.780_817_726_586_416_897_063_717_578_345_042,
    0.679_409_568_299_024_406_234_327_365_114_874,
    0.562_757_134_668_604_683_339_000_099_272_694,
    0.433_395_394_129_247_190_799_265_943_165_784,
    0.294_392_862_701_460_198_131_126_603_103_866,
    0.148_874_338_981_631_210_884_826_001_129_720,
    0.0,
];

const WGK: [f64; 11] = [
    0.011_694_638_867_371_874_278_064_396_062_192,
    0.032_558_162_307_964_727_478_818_972_459_390,
    0.054_755_896_574_351_996_031_381_300_244_580,
    0.075_039_674_810_919_952_767_043_140_916_190,
    0.093_125_454_583_697_605_535_065_465_083_366,
    0.109_387_158_802_297_641_899_210_590_325_805,
    0.123_491_976_262_065_851_077_208_814_710_200,
    0.134_709_217_311_473_325_928_054_001_771_707,
    0.142_775_938_577_060_080_797_094_273_138_717,
    0.147_739_104_901_338_491_374_841_515_972_068,
    0.149_445_554_002_916_905_664_936_468_389_821,
];

const WG: [f64; 5] = [
    0.066_671_344_308_688_137_593_568_809_893_332,
    0.149_451_349_150_580_593_145_776_339_657_697,
    0.219_086_362_515_982_043_995_534_934_228_163,
    0.269_266_719_309_996_355_091_226_921_569_469,
    0.295_524_224_714_752_870_173_892_994_651_338,
];

/// Outcome of one adaptive integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureResult {
    pub value: f64,
    /// Estimated absolute error of `value`.
    pub abs_error: f64,
    /// Number of subintervals in the final partition.
    pub subdivisions: usize,
    /// Number of integrand evaluations.
    pub evaluations: usize,
}

/// Tolerances and iteration budget for adaptive integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrature {
    epsabs: f64,
    epsrel: f64,
    limit: usize,
}

impl Default for Quadrature {
    fn default() -> Self {
        Self {
            epsabs: DEFAULT_EPSABS,
            epsrel: DEFAULT_EPSREL,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    lower: f64,
    upper: f64,
    value: f64,
    error: f64,
}

// Max-heap on the error estimate.
impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Segment {}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.error.total_cmp(&other.error)
    }
}

impl Quadrature {
    /// Create an integrator with explicit tolerances and subdivision limit.
    pub fn new(epsabs: f64, epsrel: f64, limit: usize) -> Result<Self> {
        if !(epsabs.is_finite() && epsabs >= 0.0) || !(epsrel.is_finite() && epsrel >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "tolerances must be finite and >= 0 (epsabs={epsabs}, epsrel={epsrel})"
            )));
        }
        if epsabs == 0.0 && epsrel == 0.0 {
            return Err(Error::InvalidParameter(
                "epsabs and epsrel cannot both be zero".into(),
            ));
        }
        if limit == 0 {
            return Err(Error::InvalidParameter(
                "subdivision limit must be >= 1".into(),
            ));
        }
        Ok(Self {
            epsabs,
            epsrel,
            limit,
        })
    }

    pub fn epsabs(&self) -> f64 {
        self.epsabs
    }

    pub fn epsrel(&self) -> f64 {
        self.epsrel
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn tolerance(&self, value: f64) -> f64 {
        self.epsabs.max(self.epsrel * value.abs())
    }

    /// Integrate `f` over `[lower, upper]`.
    ///
    /// Reversed bounds yield the negated integral; an empty interval yields zero
    /// without evaluating `f`.
    pub fn integrate<F>(&self, mut f: F, lower: f64, upper: f64) -> Result<QuadratureResult>
    where
        F: FnMut(f64) -> Result<f64>,
    {
        if !lower.is_finite() || !upper.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "integration bounds must be finite, got [{lower}, {upper}]"
            )));
        }
        if lower == upper {
            return Ok(QuadratureResult {
                value: 0.0,
                abs_error: 0.0,
                subdivisions: 0,
                evaluations: 0,
            });
        }
        if lower > upper {
            let mut res = self.integrate(f, upper, lower)?;
            res.value = -res.value;
            return Ok(res);
        }

        let first = kronrod21(&mut f, lower, upper)?;
        let mut evaluations = 21;
        let mut value = first.value;
        let mut error = first.error;
        let mut heap = BinaryHeap::with_capacity(self.limit);
        heap.push(first);

        while error > self.tolerance(value) {
            if heap.len() >= self.limit {
                return Err(Error::Integration {
                    lower,
                    upper,
                    abs_error: error,
                    subdivisions: heap.len(),
                });
            }
            let Some(worst) = heap.pop() else { break };
            let mid = 0.5 * (worst.lower + worst.upper);
            // Interval no longer representable; further bisection cannot help.
            if !(worst.lower < mid && mid < worst.upper) {
                return Err(Error::Integration {
                    lower,
                    upper,
                    abs_error: error,
                    subdivisions: heap.len() + 1,
                });
            }
            heap.push(kronrod21(&mut f, worst.lower, mid)?);
            heap.push(kronrod21(&mut f, mid, worst.upper)?);
            evaluations += 42;

            value = heap.iter().map(|s| s.value).sum();
            error = heap.iter().map(|s| s.error).sum();
        }

        Ok(QuadratureResult {
            value,
            abs_error: error,
            subdivisions: heap.len(),
            evaluations,
        })
    }
}

/// Integrate `f` over `[lower, upper]` with the default tolerances.
pub fn integrate<F>(f: F, lower: f64, upper: f64) -> Result<QuadratureResult>
where
    F: FnMut(f64) -> Result<f64>,
{
    Quadrature::default().integrate(f, lower, upper)
}

fn eval<F>(f: &mut F, x: f64) -> Result<f64>
where
    F: FnMut(f64) -> Result<f64>,
{
    let v = f(x)?;
    if !v.is_finite() {
        return Err(Error::NonFinite {
            name: "integrand",
            x,
            value: v,
        });
    }
    Ok(v)
}

/// 21-point Gauss–Kronrod estimate with the QUADPACK error heuristic.
fn kronrod21<F>(f: &mut F, lower: f64, upper: f64) -> Result<Segment>
where
    F: FnMut(f64) -> Result<f64>,
{
    let centre = 0.5 * (lower + upper);
    let half = 0.5 * (upper - lower);
    let abs_half = half.abs();

    let fc = eval(f, centre)?;
    let mut res_gauss = 0.0;
    let mut res_kronrod = WGK[10] * fc;
    let mut res_abs = res_kronrod.abs();
    let mut fv1 = [0.0f64; 10];
    let mut fv2 = [0.0f64; 10];

    for j in 0..10 {
        let absc = half * XGK[j];
        let f1 = eval(f, centre - absc)?;
        let f2 = eval(f, centre + absc)?;
        fv1[j] = f1;
        fv2[j] = f2;
        let fsum = f1 + f2;
        res_kronrod += WGK[j] * fsum;
        res_abs += WGK[j] * (f1.abs() + f2.abs());
        if j % 2 == 1 {
            res_gauss += WG[j / 2] * fsum;
        }
    }

    let mean = 0.5 * res_kronrod;
    let mut res_asc = WGK[10] * (fc - mean).abs();
    for j in 0..10 {
        res_asc += WGK[j] * ((fv1[j] - mean).abs() + (fv2[j] - mean).abs());
    }

    let value = res_kronrod * half;
    res_abs *= abs_half;
    res_asc *= abs_half;
    let mut error = ((res_kronrod - res_gauss) * half).abs();
    if res_asc != 0.0 && error != 0.0 {
        error = res_asc * (200.0 * error / res_asc).powf(1.5).min(1.0);
    }
    if res_abs > f64::MIN_POSITIVE / (50.0 * f64::EPSILON) {
        error = error.max(50.0 * f64::EPSILON * res_abs);
    }

    Ok(Segment {
        lower,
        upper,
        value,
        error,
    })
}
