//! Point-budget reduction for window results.
//!
//! The engine works on row indices: callers pass the window's positions (as
//! an `f64` axis) and values, and get back the indices of the rows to keep,
//! in ascending order. Typed position columns are then gathered by index so
//! microsecond timestamps never pass through a float.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Downsampling method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Largest-Triangle-Three-Buckets
    #[default]
    Lttb,
    /// Evenly spaced by row index
    Uniform,
    /// Stride decimation pushed down to the storage engine
    Native,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Lttb => "lttb",
            Method::Uniform => "uniform",
            Method::Native => "native",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lttb" => Ok(Method::Lttb),
            "uniform" => Ok(Method::Uniform),
            "native" => Ok(Method::Native),
            other => Err(Error::Validation(format!(
                "unknown method {other:?}, expected lttb, uniform or native"
            ))),
        }
    }
}

/// Indices of the rows to keep, ascending.
///
/// Returns every index when `xs.len() <= target`. `Native` rows are already
/// decimated by the store; anything still over budget is thinned uniformly.
pub fn select(xs: &[f64], ys: &[f64], target: usize, method: Method) -> Vec<usize> {
    let n = xs.len().min(ys.len());
    if n <= target {
        return (0..n).collect();
    }
    match method {
        Method::Lttb => lttb(xs, ys, target),
        Method::Uniform | Method::Native => uniform(n, target),
    }
}

/// `target` indices linearly spaced over `[0, n-1]`.
pub fn uniform(n: usize, target: usize) -> Vec<usize> {
    if target >= n {
        return (0..n).collect();
    }
    match target {
        0 => Vec::new(),
        1 => vec![0],
        m => (0..m).map(|i| i * (n - 1) / (m - 1)).collect(),
    }
}

/// Largest-Triangle-Three-Buckets over `(xs, ys)`.
pub fn lttb(xs: &[f64], ys: &[f64], target: usize) -> Vec<usize> {
    let n = xs.len().min(ys.len());
    if target >= n {
        return (0..n).collect();
    }
    if target < 3 {
        let mut picks = vec![0, n / 2, n - 1];
        picks.truncate(target);
        return picks;
    }

    let bucket = (n - 2) as f64 / (target - 2) as f64;
    let edge = |k: usize| ((k as f64 * bucket).floor() as usize + 1).min(n);

    let mut sampled = Vec::with_capacity(target);
    sampled.push(0);
    let mut a = 0usize;

    for i in 0..target - 2 {
        // Mean of the next bucket; the final point when that bucket is empty
        let (avg_start, avg_end) = (edge(i + 1), edge(i + 2));
        let (avg_x, avg_y) = if avg_start < avg_end {
            let len = (avg_end - avg_start) as f64;
            let sx: f64 = xs[avg_start..avg_end].iter().sum();
            let sy: f64 = ys[avg_start..avg_end].iter().sum();
            (sx / len, sy / len)
        } else {
            (xs[n - 1], ys[n - 1])
        };

        let (start, end) = (edge(i), edge(i + 1));
        let (ax, ay) = (xs[a], ys[a]);
        let mut best = start;
        let mut best_area = -1.0;
        for j in start..end {
            let area = ((ax - avg_x) * (ys[j] - ay) - (ax - xs[j]) * (avg_y - ay)).abs() * 0.5;
            if area > best_area {
                best_area = area;
                best = j;
            }
        }

        sampled.push(best);
        a = best;
    }

    sampled.push(n - 1);
    sampled
}
