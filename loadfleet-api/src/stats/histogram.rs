use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// Sentinel for `min`/`max` before any sample has been recorded.
const UNSET: i64 = -1;

/// Bucket count used when a spec does not say otherwise.
pub const DEFAULT_NUM_BUCKETS: usize = 3000;

fn default_num_buckets() -> usize {
    DEFAULT_NUM_BUCKETS
}

fn default_percentiles() -> Vec<f64> {
    vec![0.95, 0.99]
}

/// Shape parameters for a [`Histogram`].
///
/// These travel with every snapshot so the receiving side can reconstruct a
/// sketch of the same shape on first sight. The canonical wire name for the
/// bucket count is `numBuckets`; `buckets` is accepted as an input alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramParams {
    #[serde(alias = "buckets", default = "default_num_buckets")]
    pub num_buckets: usize,
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            num_buckets: DEFAULT_NUM_BUCKETS,
            percentiles: default_percentiles(),
        }
    }
}

/// A fixed-width histogram over non-negative integer samples.
///
/// Samples below the bucket count land in `items` (one unit per bucket);
/// anything larger is kept verbatim in the unbounded `extra` overflow list.
/// Percentiles are computed by rank from the top: the target rank is
/// `floor(length * (1 - p))` samples above the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    #[serde(default)]
    pub params: HistogramParams,
    items: Vec<u64>,
    extra: Vec<u64>,
    min: i64,
    max: i64,
    sum: u64,
    length: u64,
    #[serde(skip)]
    sorted: bool,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(HistogramParams::default())
    }
}

impl Histogram {
    pub fn new(params: HistogramParams) -> Self {
        let items = vec![0; params.num_buckets];
        Self {
            params,
            items,
            extra: Vec::new(),
            min: UNSET,
            max: UNSET,
            sum: 0,
            length: 0,
            sorted: false,
        }
    }

    pub fn record(&mut self, sample: u64) {
        match self.items.get_mut(sample as usize) {
            Some(bucket) => *bucket += 1,
            None => {
                self.extra.push(sample);
                self.sorted = false;
            }
        }
        let sample_i = sample as i64;
        if self.min == UNSET || sample_i < self.min {
            self.min = sample_i;
        }
        if sample_i > self.max {
            self.max = sample_i;
        }
        self.sum += sample;
        self.length += 1;
    }

    pub fn clear(&mut self) {
        self.items.iter_mut().for_each(|bucket| *bucket = 0);
        self.extra.clear();
        self.min = UNSET;
        self.max = UNSET;
        self.sum = 0;
        self.length = 0;
        self.sorted = false;
    }

    /// Value at percentile `p`, by rank from the top of the distribution.
    ///
    /// With target rank `k = floor(length * (1 - p))`: if more than `k`
    /// samples overflowed into `extra`, the answer is an exact overflow
    /// sample; otherwise buckets are scanned from high to low until `k`
    /// samples have been seen, and the answer is that bucket's index.
    pub fn percentile(&mut self, p: f64) -> u64 {
        let target = (self.length as f64 * (1.0 - p)).floor() as usize;
        if self.extra.len() > target {
            if !self.sorted {
                self.extra.sort_unstable();
                self.sorted = true;
            }
            self.extra[self.extra.len() - target - 1]
        } else {
            let mut seen = self.extra.len();
            for i in (0..self.items.len()).rev() {
                if self.items[i] > 0 {
                    seen += self.items[i] as usize;
                    if seen >= target {
                        return i as u64;
                    }
                }
            }
            0
        }
    }

    pub fn median(&mut self) -> u64 {
        self.percentile(0.5)
    }

    pub fn mean(&self) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        self.sum as f64 / self.length as f64
    }

    /// Standard deviation, integrating squared deviation across both the
    /// bucket array and the overflow list.
    pub fn stddev(&self) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let mut deviation = 0.0;
        for (value, &count) in self.items.iter().enumerate() {
            if count > 0 {
                deviation += (value as f64 - mean).powi(2) * count as f64;
            }
        }
        for &value in &self.extra {
            deviation += (value as f64 - mean).powi(2);
        }
        (deviation / self.length as f64).sqrt()
    }

    pub fn merge(&mut self, other: &Histogram) -> Result<(), MergeError> {
        if self.items.len() != other.items.len() {
            return Err(MergeError::IncompatibleHistograms {
                left: self.items.len(),
                right: other.items.len(),
            });
        }
        for (mine, theirs) in self.items.iter_mut().zip(&other.items) {
            *mine += theirs;
        }
        self.extra.extend_from_slice(&other.extra);
        self.sorted = false;
        self.min = match (self.min, other.min) {
            (UNSET, theirs) => theirs,
            (mine, UNSET) => mine,
            (mine, theirs) => mine.min(theirs),
        };
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.length += other.length;
        Ok(())
    }

    pub fn summary(&mut self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();
        summary.insert("min".into(), self.min.into());
        summary.insert("max".into(), self.max.into());
        summary.insert("avg".into(), self.mean().into());
        summary.insert("median".into(), self.median().into());
        for p in self.params.percentiles.clone() {
            summary.insert(format!("{}%", p * 100.0), self.percentile(p).into());
        }
        summary.into()
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn items(&self) -> &[u64] {
        &self.items
    }

    pub fn extra(&self) -> &[u64] {
        &self.extra
    }
}
