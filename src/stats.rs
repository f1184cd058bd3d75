use serde::{Deserialize, Serialize};

/// Online mean and variance of a stream of values (Welford's algorithm).
#[derive(Default)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    sq_dev_sum: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub n_vals: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;
        let delta = val - self.mean;
        self.mean += delta / self.n_vals as f64;
        self.sq_dev_sum += delta * (val - self.mean);
    }

    pub fn report(&self) -> AccumulatorReport {
        let (mean, std_dev) = match self.n_vals {
            0 => (f64::NAN, f64::NAN),
            1 => (self.mean, f64::NAN),
            n => (self.mean, (self.sq_dev_sum / (n - 1) as f64).sqrt()),
        };
        AccumulatorReport {
            n_vals: self.n_vals,
            mean,
            std_dev,
        }
    }
}

/// Series of correlated values, summarized after discarding the initial transient.
#[derive(Default)]
pub struct TimeSeries {
    vals: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    /// Number of leading values discarded as transient.
    pub n_discarded: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// Standard error of the mean, corrected for autocorrelation.
    pub sem: f64,
    /// Whether the transient ended before the second half of the series.
    pub is_equil: bool,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, val: f64) {
        self.vals.push(val);
    }

    pub fn report(&self) -> TimeSeriesReport {
        let n_discarded = transient_len(&self.vals);
        let tail = &self.vals[n_discarded..];
        TimeSeriesReport {
            n_discarded,
            mean: mean(tail),
            std_dev: variance(tail).sqrt(),
            sem: blocked_sem(tail),
            is_equil: n_discarded < self.vals.len() / 2,
        }
    }
}

fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

fn variance(vals: &[f64]) -> f64 {
    if vals.len() < 2 {
        return f64::NAN;
    }
    let mean = mean(vals);
    let sq_dev_sum: f64 = vals.iter().map(|&val| (val - mean).powi(2)).sum();
    sq_dev_sum / (vals.len() - 1) as f64
}

/// Standard error of the mean from repeated pairwise block averaging.
///
/// Takes the largest estimate over all blocking levels that keep at least
/// four blocks, which bounds the error of correlated data from above.
fn blocked_sem(vals: &[f64]) -> f64 {
    const MIN_BLOCKS: usize = 4;

    let mut blocks = vals.to_vec();
    let mut sem = f64::NAN;
    while blocks.len() >= MIN_BLOCKS {
        let est = (variance(&blocks) / blocks.len() as f64).sqrt();
        if sem.is_nan() || est > sem {
            sem = est;
        }
        blocks = blocks
            .chunks_exact(2)
            .map(|pair| (pair[0] + pair[1]) / 2.0)
            .collect();
    }
    if sem.is_nan() {
        sem = (variance(vals) / vals.len() as f64).sqrt();
    }
    sem
}

/// Length of the initial transient, by the marginal standard error rule.
///
/// Candidate cut points are the multiples of `len / 16` up to half the series;
/// the one leaving the tail with the smallest marginal standard error wins.
fn transient_len(vals: &[f64]) -> usize {
    let len = vals.len();
    let stride = (len / 16).max(1);

    let mut best_cut = 0;
    let mut best_mse = f64::INFINITY;
    for cut in (0..=len / 2).step_by(stride) {
        let tail = &vals[cut..];
        if tail.len() < 2 {
            break;
        }
        let n_tail = tail.len() as f64;
        let mse = variance(tail) * (n_tail - 1.0) / (n_tail * n_tail);
        if mse < best_mse {
            best_mse = mse;
            best_cut = cut;
        }
    }
    best_cut
}
