//! Outlier detection over per-method size samples.
//!
//! Each managed method contributes its total attributed size and its code
//! expansion ratio (compiled bytes per source instruction byte). At the end of
//! a report both metrics are swept from a high number of standard deviations
//! down to one, reporting methods that lie above the mean by more than the
//! current threshold. A method is reported at most once per metric, and at
//! most [`REPORT_CAP`] methods are reported per metric.
//!
//! When the cap is reached while the threshold is still above one standard
//! deviation, the sweep abandons the intermediate thresholds and continues
//! directly at one standard deviation, where further matches are only counted.
//! Methods that would have matched at the skipped thresholds are never
//! evaluated there.

use std::fmt;

/// Maximum number of methods reported per metric.
pub const REPORT_CAP: usize = 20;

/// First threshold, in standard deviations, of the size sweep.
pub const SIZE_MAX_DEVIATIONS: u32 = 100;

/// First threshold, in standard deviations, of the expansion sweep.
pub const EXPANSION_MAX_DEVIATIONS: u32 = 10;

/// Which sample metric an outlier was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierMetric {
    Size,
    Expansion,
}

/// A reported outlier.
#[derive(Debug, Clone, PartialEq)]
pub struct Outlier {
    pub name: String,
    /// Threshold, in standard deviations, at which it was reported.
    pub deviations: u32,
    pub value: f64,
}

/// Sweep result for one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricOutliers {
    pub metric: OutlierMetric,
    pub reported: Vec<Outlier>,
    /// Methods above one standard deviation that were not reported because
    /// the cap had been reached.
    pub skipped: usize,
}

impl MetricOutliers {
    fn empty(metric: OutlierMetric) -> Self {
        Self {
            metric,
            reported: Vec::new(),
            skipped: 0,
        }
    }
}

/// Result of [`OutlierDetector::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierSummary {
    pub size: MetricOutliers,
    pub expansion: MetricOutliers,
}

#[derive(Debug, Clone)]
struct Sample {
    name: String,
    size: usize,
    expansion: f64,
}

/// Accumulates `(method, size, expansion)` samples for one report.
#[derive(Debug, Default)]
pub struct OutlierDetector {
    samples: Vec<Sample>,
}

impl OutlierDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, name: impl Into<String>, size: usize, expansion: f64) {
        self.samples.push(Sample {
            name: name.into(),
            size,
            expansion,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Run both sweeps, consuming the accumulated samples.
    ///
    /// With fewer than two samples there is no variance and nothing is
    /// reported.
    pub fn finalize(&mut self) -> OutlierSummary {
        let samples = std::mem::take(&mut self.samples);
        if samples.len() < 2 {
            return OutlierSummary {
                size: MetricOutliers::empty(OutlierMetric::Size),
                expansion: MetricOutliers::empty(OutlierMetric::Expansion),
            };
        }
        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        let mut sizes: Vec<Option<f64>> = samples.iter().map(|s| Some(s.size as f64)).collect();
        let mut expansions: Vec<Option<f64>> =
            samples.iter().map(|s| Some(s.expansion)).collect();
        let size = sweep(OutlierMetric::Size, &names, &mut sizes, SIZE_MAX_DEVIATIONS);
        let expansion = sweep(
            OutlierMetric::Expansion,
            &names,
            &mut expansions,
            EXPANSION_MAX_DEVIATIONS,
        );
        log::debug!(
            "outliers over {} samples: {} by size ({} skipped), {} by expansion ({} skipped)",
            samples.len(),
            size.reported.len(),
            size.skipped,
            expansion.reported.len(),
            expansion.skipped
        );
        OutlierSummary { size, expansion }
    }
}

/// Sample mean and variance (divided by `n - 1`). Requires `n >= 2`.
pub fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    (mean, variance)
}

/// Sweep one metric. Reported entries are set to `None`.
fn sweep(
    metric: OutlierMetric,
    names: &[&str],
    values: &mut [Option<f64>],
    max_deviations: u32,
) -> MetricOutliers {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    let (mean, variance) = mean_and_variance(&observed);
    let mut result = MetricOutliers::empty(metric);

    let mut k = max_deviations;
    while k > 0 {
        let threshold = (k as f64) * (k as f64) * variance;
        let mut jump = false;
        for (j, slot) in values.iter_mut().enumerate() {
            let Some(value) = *slot else { continue };
            if value <= mean {
                continue;
            }
            let deviation = value - mean;
            if deviation * deviation <= threshold {
                continue;
            }
            if result.reported.len() >= REPORT_CAP {
                if k == 1 {
                    result.skipped += 1;
                    continue;
                }
                jump = true;
                break;
            }
            result.reported.push(Outlier {
                name: names[j].to_string(),
                deviations: k,
                value,
            });
            *slot = None;
        }
        k = if jump { 1 } else { k - 1 };
    }
    result
}

/// Human-readable byte count: `999B`, `12KB`, `10MB`.
pub fn pretty_size(bytes: usize) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    let bytes = bytes as u64;
    let (unit, suffix) = if bytes >= 10 * GB {
        (GB, "GB")
    } else if bytes >= 10 * MB {
        (MB, "MB")
    } else if bytes >= 10 * KB {
        (KB, "KB")
    } else {
        (1, "B")
    };
    format!("{}{}", bytes / unit, suffix)
}

impl fmt::Display for MetricOutliers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (heading, what) = match self.metric {
            OutlierMetric::Size => ("Big methods", "size"),
            OutlierMetric::Expansion => ("Large expansion methods", "expansion"),
        };
        let mut current = None;
        for outlier in &self.reported {
            if current != Some(outlier.deviations) {
                writeln!(
                    f,
                    "\n{heading} (size > {} standard deviations the norm):",
                    outlier.deviations
                )?;
                current = Some(outlier.deviations);
            }
            match self.metric {
                OutlierMetric::Size => writeln!(
                    f,
                    "\t{} requires storage of {}",
                    outlier.name,
                    pretty_size(outlier.value as usize)
                )?,
                OutlierMetric::Expansion => {
                    writeln!(f, "\t{} expanded code by {:.2}", outlier.name, outlier.value)?
                }
            }
        }
        if self.skipped > 0 {
            writeln!(
                f,
                "\t... skipped {} methods with {what} > 1 standard deviation from the norm",
                self.skipped
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for OutlierSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.size)?;
        write!(f, "{}", self.expansion)?;
        writeln!(f)
    }
}
