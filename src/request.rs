use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonic identity of an asset request.
///
/// Every URL change (and every mount) issues a fresh generation; callbacks
/// carrying an older one are stale and must not touch scene state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    /// Sentinel that is never assigned to a request.
    pub const NONE: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An issued asset request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    url: String,
    generation: Generation,
}

impl AssetRequest {
    pub fn new(url: impl Into<String>, generation: Generation) -> Self {
        Self {
            url: url.into(),
            generation,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// File name used as the sub-format hint for the decoder.
    pub fn file_name_hint(&self) -> &str {
        file_name_hint(&self.url)
    }
}

/// Returns the last path segment of `url`, without query or fragment.
pub fn file_name_hint(url: &str) -> &str {
    let end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
    let path = url[..end].trim_end_matches('/');
    path.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(path)
}

/// Fraction of a transfer that has completed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct LoadProgress {
    fraction: f32,
}

impl LoadProgress {
    /// Builds progress from a byte count, clamping into `[0, 1]`.
    pub fn from_bytes(loaded: u64, total: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        Some(Self::from_fraction(loaded as f64 / total as f64))
    }

    pub fn from_fraction(fraction: f64) -> Self {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            fraction: fraction as f32,
        }
    }

    pub fn complete() -> Self {
        Self { fraction: 1.0 }
    }

    pub fn fraction(self) -> f32 {
        self.fraction
    }

    pub fn percent(self) -> f32 {
        self.fraction * 100.0
    }
}

/// Filters raw progress so the host only sees strictly increasing values.
///
/// Network layers may repeat or reorder progress events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressGate {
    last: Option<f32>,
}

impl ProgressGate {
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Returns the progress to report, or `None` if it does not advance.
    pub fn admit(&mut self, progress: LoadProgress) -> Option<LoadProgress> {
        match self.last {
            Some(last) if progress.fraction() <= last => None,
            _ => {
                self.last = Some(progress.fraction());
                Some(progress)
            }
        }
    }
}
