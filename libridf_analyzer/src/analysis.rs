use serde::Serialize;

use super::config::ResolvedParams;

/// The nine leading-edge fractions (percent of amplitude) timed per pulse.
pub const CFD_PERCENTS: [i32; 9] = [10, 20, 30, 40, 50, 60, 70, 80, 90];

/// Everything the analyzer extracts from one waveform.
///
/// Times that were not found carry -1; quantities that could not be
/// computed at all carry NaN. `valid` is the summary flag: when false the
/// numeric fields are only meaningful as far as the failure allowed.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AnalysisResult {
    pub baseline: f32,
    pub baseline_rms: f32,
    pub amplitude: f32,
    pub peak_sample: i32,
    pub peak_time_ns: f32,
    pub dcfd_time_ns: f32,
    pub cfd_times: [f32; 9],
    pub risetime: f32,
    pub valid: bool,
}

impl AnalysisResult {
    /// The all-failed result: NaN numerics, -1 times.
    pub fn invalid() -> Self {
        Self {
            baseline: f32::NAN,
            baseline_rms: f32::NAN,
            amplitude: f32::NAN,
            peak_sample: -1,
            peak_time_ns: -1.0,
            dcfd_time_ns: -1.0,
            cfd_times: [-1.0; 9],
            risetime: f32::NAN,
            valid: false,
        }
    }
}

/// Analyze one waveform with fully-resolved parameters.
///
/// Pure: no state is kept between calls, and identical inputs produce
/// identical outputs. Degenerate inputs (disabled channel, empty waveform,
/// bad baseline window, no positive-going signal) produce an invalid result
/// rather than an error.
pub fn analyze(samples: &[i16], params: &ResolvedParams) -> AnalysisResult {
    let nsample = samples.len();

    if !params.enabled || nsample == 0 || !baseline_range_valid(params, nsample) {
        return AnalysisResult::invalid();
    }

    let (baseline, baseline_rms) = compute_baseline(
        samples,
        params.baseline_start as usize,
        params.baseline_end as usize,
    );

    // Flip negative pulses so the peak is always a maximum
    let sign = params.polarity.sign();
    let mut normalized: Vec<f64> = samples
        .iter()
        .map(|&s| (s as f64 - baseline) * sign)
        .collect();
    if params.ma_window_size > 1 {
        normalized = moving_average(&normalized, params.ma_window_size as usize);
    }

    let (peak_idx, amplitude) = peak_of(&normalized);
    if amplitude <= 0.0 {
        return AnalysisResult {
            baseline: baseline as f32,
            baseline_rms: baseline_rms as f32,
            amplitude: 0.0,
            peak_sample: peak_idx as i32,
            peak_time_ns: -1.0,
            dcfd_time_ns: -1.0,
            cfd_times: [-1.0; 9],
            risetime: f32::NAN,
            valid: false,
        };
    }

    let mut cfd_times = [-1.0f32; 9];
    for (slot, percent) in cfd_times.iter_mut().zip(CFD_PERCENTS) {
        let threshold = amplitude * (percent as f64 / 100.0);
        *slot = cfd_time(&normalized, peak_idx, threshold, params.sample_rate_ns);
    }

    let dcfd_time_ns = if params.dcfd_enabled && peak_idx > 0 {
        dcfd_time(
            &normalized,
            params.baseline_end as usize,
            peak_idx,
            params.dcfd_delay as usize,
            params.dcfd_fraction,
            params.sample_rate_ns,
        )
    } else {
        -1.0
    };

    let risetime = if cfd_times[0] >= 0.0 && cfd_times[8] >= 0.0 {
        cfd_times[8] - cfd_times[0]
    } else {
        f32::NAN
    };

    AnalysisResult {
        baseline: baseline as f32,
        baseline_rms: baseline_rms as f32,
        amplitude: amplitude as f32,
        peak_sample: peak_idx as i32,
        peak_time_ns: (peak_idx as f64 * params.sample_rate_ns) as f32,
        dcfd_time_ns,
        cfd_times,
        risetime,
        valid: true,
    }
}

/// True when any sample deviates from the baseline by at least `k` times
/// the baseline RMS. Used to pre-select waveforms worth plotting or fitting.
pub fn has_signal_above(samples: &[i16], baseline: f32, baseline_rms: f32, k: f64) -> bool {
    if samples.is_empty() || !(baseline_rms > 0.0) {
        return false;
    }
    let threshold = k * baseline_rms as f64;
    samples
        .iter()
        .any(|&s| (s as f64 - baseline as f64).abs() >= threshold)
}

fn baseline_range_valid(params: &ResolvedParams, nsample: usize) -> bool {
    params.baseline_start >= 0
        && params.baseline_start < params.baseline_end
        && params.baseline_end as usize <= nsample
}

/// Mean and RMS over the baseline window `[start, end)`.
fn compute_baseline(samples: &[i16], start: usize, end: usize) -> (f64, f64) {
    let window = &samples[start..end];
    let count = window.len() as f64;

    let mean = window.iter().map(|&s| s as f64).sum::<f64>() / count;
    let sqsum = window
        .iter()
        .map(|&s| {
            let d = s as f64 - mean;
            d * d
        })
        .sum::<f64>();

    (mean, (sqsum / count).sqrt())
}

/// Centered moving average with a window truncated at both boundaries; the
/// divisor is the truncated window length.
fn moving_average(input: &[f64], window_size: usize) -> Vec<f64> {
    let n = input.len();
    let half = window_size / 2;

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n);
            input[start..end].iter().sum::<f64>() / (end - start) as f64
        })
        .collect()
}

fn peak_of(normalized: &[f64]) -> (usize, f64) {
    let mut peak_idx = 0;
    let mut amplitude = f64::MIN;
    for (i, &v) in normalized.iter().enumerate() {
        if v > amplitude {
            amplitude = v;
            peak_idx = i;
        }
    }
    (peak_idx, amplitude)
}

/// Time at which the leading edge crosses `threshold`, walking leftward
/// from the peak and interpolating between the bracketing samples.
fn cfd_time(normalized: &[f64], peak_idx: usize, threshold: f64, sample_rate_ns: f64) -> f32 {
    if peak_idx == 0 || peak_idx >= normalized.len() {
        return -1.0;
    }

    for i in (1..=peak_idx).rev() {
        let v0 = normalized[i - 1];
        let v1 = normalized[i];
        if !(v0 < threshold && v1 >= threshold) {
            continue;
        }

        let denom = v1 - v0;
        if denom.abs() < 1e-12 {
            return (i as f64 * sample_rate_ns) as f32;
        }
        let sample_pos = (i - 1) as f64 + (threshold - v0) / denom;
        return (sample_pos * sample_rate_ns) as f32;
    }

    -1.0
}

/// Zero-crossing time of `fraction * y[i] - y[i - delay]` between the end
/// of the baseline window and the peak.
fn dcfd_time(
    normalized: &[f64],
    baseline_end: usize,
    peak_idx: usize,
    delay: usize,
    fraction: f64,
    sample_rate_ns: f64,
) -> f32 {
    let n = normalized.len();
    let search_start = baseline_end.max(delay);
    let search_end = peak_idx.min(n - 1);
    if search_start >= search_end {
        return -1.0;
    }

    for i in search_start..search_end {
        let z_i = normalized[i] * fraction - normalized[i - delay];
        let z_next = normalized[i + 1] * fraction - normalized[i + 1 - delay];
        if z_i > 0.0 && z_next <= 0.0 {
            let denom = z_i - z_next;
            if denom.abs() < 1e-12 {
                return (i as f64 * sample_rate_ns) as f32;
            }
            return ((i as f64 + z_i / denom) * sample_rate_ns) as f32;
        }
    }

    -1.0
}
