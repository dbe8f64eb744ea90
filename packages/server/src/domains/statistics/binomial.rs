//! Exact binomial helpers for the coin toss experiment.
//!
//! Probabilities are computed in log space so that session totals in the
//! thousands of trials neither overflow nor underflow before the final
//! `exp`. Edge-case behaviour is relied on by the hypothesis test and must
//! not drift:
//!
//! - `k < 0` or `k > n` has probability 0
//! - `p == 0` puts all mass on `k == 0`, `p == 1` on `k == n`
//! - the two-sided p-value sums every outcome no more likely than the
//!   observed one (with a `1e-15` slack) and is capped at 1

/// Absolute slack used when comparing outcome probabilities, so the observed
/// outcome always counts itself despite rounding.
pub const PMF_TOLERANCE: f64 = 1e-15;

/// Cumulative `ln(i!)` for `i` in `0..=n`.
///
/// Built once per call site so a p-value over `n` trials costs O(n) log
/// evaluations instead of O(n²).
struct LogFactorials(Vec<f64>);

impl LogFactorials {
    fn up_to(n: u64) -> Self {
        let mut table = Vec::with_capacity(n as usize + 1);
        let mut sum = 0.0_f64;
        table.push(0.0);
        for i in 1..=n {
            if i >= 2 {
                sum += (i as f64).ln();
            }
            table.push(sum);
        }
        Self(table)
    }

    fn ln_choose(&self, n: u64, k: u64) -> f64 {
        self.0[n as usize] - self.0[k as usize] - self.0[(n - k) as usize]
    }
}

fn pmf_with(table: &LogFactorials, n: u64, k: i64, p: f64) -> f64 {
    if k < 0 || k as u64 > n {
        return 0.0;
    }
    let k = k as u64;
    if p == 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    if p == 1.0 {
        return if k == n { 1.0 } else { 0.0 };
    }
    let ln_probability =
        table.ln_choose(n, k) + k as f64 * p.ln() + (n - k) as f64 * (1.0 - p).ln();
    ln_probability.exp()
}

/// Probability of exactly `k` successes in `n` independent trials with
/// success probability `p`.
///
/// `p` outside `[0, 1]` yields NaN.
pub fn binomial_pmf(n: u64, k: i64, p: f64) -> f64 {
    if k < 0 || k as u64 > n {
        return 0.0;
    }
    pmf_with(&LogFactorials::up_to(n), n, k, p)
}

/// Exact two-sided p-value (probability-ordering definition).
pub fn binomial_p_value_two_sided(n: u64, k: i64, p: f64) -> f64 {
    let table = LogFactorials::up_to(n);
    let observed = pmf_with(&table, n, k, p);
    let mut total = 0.0_f64;
    for i in 0..=n {
        let probability = pmf_with(&table, n, i as i64, p);
        if probability <= observed + PMF_TOLERANCE {
            total += probability;
        }
    }
    total.min(1.0)
}

/// Bins heads counts into `n + 1` buckets. Out-of-range counts are skipped.
pub fn heads_histogram<I>(counts: I, n: usize) -> Vec<u32>
where
    I: IntoIterator<Item = i64>,
{
    let mut bins = vec![0_u32; n + 1];
    for count in counts {
        if count >= 0 && (count as u64) <= n as u64 {
            bins[count as usize] += 1;
        }
    }
    bins
}

/// PMF for every outcome `0..=n`; the reference curve drawn over the
/// observed histogram.
pub fn expected_distribution(n: u64, p: f64) -> Vec<f64> {
    let table = LogFactorials::up_to(n);
    (0..=n).map(|k| pmf_with(&table, n, k as i64, p)).collect()
}

/// Histogram as relative frequencies. All zeros with no participants.
pub fn normalized_histogram(histogram: &[u32], participants: usize) -> Vec<f64> {
    if participants == 0 {
        return vec![0.0; histogram.len()];
    }
    histogram
        .iter()
        .map(|&count| f64::from(count) / participants as f64)
        .collect()
}
