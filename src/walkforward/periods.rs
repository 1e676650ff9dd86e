//! Test split and walk-forward window generation.
//!
//! Month arithmetic is calendar based (`2023-01-31 + 1 month = 2023-02-28`).
//! Every boundary is computed from the range start rather than by repeated
//! addition so clamped days never drift.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{RangeError, TimeRange};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WindowError {
    #[error("Insufficient history: {pre} fits no {train_months}m train + {oos_months}m OOS window")]
    InsufficientHistory {
        pre: TimeRange,
        train_months: u32,
        oos_months: u32,
    },

    #[error("Insufficient history: {history} leaves nothing before a {test_months}m test range")]
    NoPreRange { history: TimeRange, test_months: u32 },

    #[error("Invalid window length: {0} must be at least one month")]
    ZeroLength(&'static str),

    #[error(transparent)]
    Range(#[from] RangeError),
}

/// Configuration for walk-forward windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Trailing history length in years, ending at the last bar.
    pub years: u32,
    /// Held-out test length in months.
    pub test_months: u32,
    /// Train length in months.
    pub train_months: u32,
    /// OOS length in months; also the step between windows.
    pub oos_months: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            years: 5,
            test_months: 12,
            train_months: 12,
            oos_months: 3,
        }
    }
}

/// One walk-forward step; `train.end() == oos.start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Position in the window set (0-based).
    pub index: usize,
    /// Training range, before `oos`.
    pub train: TimeRange,
    /// Out-of-sample range that follows `train`.
    pub oos: TimeRange,
}

/// Chronological, contiguous walk-forward windows over the Pre range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSet {
    pre: TimeRange,
    windows: Vec<Window>,
}

impl WindowSet {
    /// Generate windows inside `pre`: the first train range starts at
    /// `pre.start()`, each step advances by `oos_months`, and generation stops
    /// before an OOS range would pass `pre.end()`.
    pub fn generate(pre: TimeRange, train_months: u32, oos_months: u32) -> Result<Self, WindowError> {
        if train_months == 0 {
            return Err(WindowError::ZeroLength("train_months"));
        }
        if oos_months == 0 {
            return Err(WindowError::ZeroLength("oos_months"));
        }

        let base = pre.start();
        let mut windows = Vec::new();

        for k in 0u32.. {
            let (Some(train_start), Some(oos_start), Some(oos_end)) = (
                add_months(base, k * oos_months),
                add_months(base, train_months + k * oos_months),
                add_months(base, train_months + (k + 1) * oos_months),
            ) else {
                break;
            };

            if oos_end > pre.end() {
                break;
            }

            windows.push(Window {
                index: k as usize,
                train: TimeRange::new(train_start, oos_start)?,
                oos: TimeRange::new(oos_start, oos_end)?,
            });
        }

        if windows.is_empty() {
            return Err(WindowError::InsufficientHistory {
                pre,
                train_months,
                oos_months,
            });
        }

        Ok(Self { pre, windows })
    }

    pub fn pre(&self) -> TimeRange {
        self.pre
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Window> {
        self.windows.iter()
    }
}

/// Held-out test range.
///
/// Not `Clone`: exactly one value exists per split, and evaluating the frozen
/// selection consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct HeldOutTest {
    range: TimeRange,
}

impl HeldOutTest {
    pub fn range(&self) -> TimeRange {
        self.range
    }
}

/// Pre / Test partition of a history range; `pre.end() == test.start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    /// Full history range.
    pub history: TimeRange,
    /// Range used for search and selection.
    pub pre: TimeRange,
    /// Held-out range after `pre`.
    pub test: TimeRange,
}

impl Split {
    /// Take the trailing `test_months` of `history` as Test and everything before as Pre.
    pub fn trailing(history: TimeRange, test_months: u32) -> Result<(Self, HeldOutTest), WindowError> {
        if test_months == 0 {
            return Err(WindowError::ZeroLength("test_months"));
        }

        let cut = sub_months(history.end(), test_months)
            .filter(|cut| *cut > history.start())
            .ok_or(WindowError::NoPreRange {
                history,
                test_months,
            })?;

        let split = Self {
            history,
            pre: TimeRange::new(history.start(), cut)?,
            test: TimeRange::new(cut, history.end())?,
        };
        Ok((split, HeldOutTest { range: split.test }))
    }
}

/// Trailing `years` of data ending just after `last_bar`.
pub fn trailing_history(last_bar: DateTime<Utc>, years: u32) -> Result<TimeRange, WindowError> {
    if years == 0 {
        return Err(WindowError::ZeroLength("years"));
    }
    let end = last_bar + chrono::Duration::seconds(1);
    let start = sub_months(end, years * 12).ok_or(WindowError::ZeroLength("years"))?;
    Ok(TimeRange::new(start, end)?)
}

fn add_months(ts: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    ts.checked_add_months(Months::new(months))
}

fn sub_months(ts: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    ts.checked_sub_months(Months::new(months))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn range(a: DateTime<Utc>, b: DateTime<Utc>) -> TimeRange {
        TimeRange::new(a, b).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = WindowConfig::default();
        assert_eq!(config.years, 5);
        assert_eq!(config.train_months, 12);
        assert_eq!(config.oos_months, 3);
        assert_eq!(config.test_months, 12);
    }

    #[test]
    fn test_windows_are_contiguous_and_bounded() {
        let pre = range(ymd(2020, 1, 1), ymd(2023, 1, 1));
        let set = WindowSet::generate(pre, 12, 3).unwrap();

        // 36 months of Pre: 12 train leaves 24 months = 8 OOS quarters
        assert_eq!(set.len(), 8);
        assert_eq!(set.windows()[0].train.start(), pre.start());
        for w in set.iter() {
            assert_eq!(w.train.end(), w.oos.start());
            assert!(w.oos.end() <= pre.end());
        }
        for pair in set.windows().windows(2) {
            assert_eq!(pair[0].oos.end(), pair[1].oos.start());
            assert!(!pair[0].oos.overlaps(&pair[1].oos));
        }
        assert_eq!(set.windows()[7].oos.end(), pre.end());
    }

    #[test]
    fn test_partial_last_window_is_dropped() {
        let pre = range(ymd(2020, 1, 1), ymd(2021, 5, 15));
        let set = WindowSet::generate(pre, 12, 3).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.windows()[0].oos.end(), ymd(2021, 4, 1));
    }

    #[test]
    fn test_insufficient_history() {
        let pre = range(ymd(2020, 1, 1), ymd(2021, 3, 31));
        let err = WindowSet::generate(pre, 12, 3).unwrap_err();
        assert!(matches!(err, WindowError::InsufficientHistory { .. }));
    }

    #[test]
    fn test_month_end_does_not_drift() {
        let pre = range(ymd(2020, 1, 31), ymd(2021, 1, 31));
        let set = WindowSet::generate(pre, 1, 1).unwrap();
        // Feb clamps to the 29th but March still ends on the 31st
        assert_eq!(set.windows()[0].oos.start(), ymd(2020, 2, 29));
        assert_eq!(set.windows()[1].oos.start(), ymd(2020, 3, 31));
    }

    #[test]
    fn test_zero_lengths_rejected() {
        let pre = range(ymd(2020, 1, 1), ymd(2023, 1, 1));
        assert_eq!(
            WindowSet::generate(pre, 0, 3),
            Err(WindowError::ZeroLength("train_months"))
        );
        assert_eq!(
            WindowSet::generate(pre, 12, 0),
            Err(WindowError::ZeroLength("oos_months"))
        );
    }

    #[test]
    fn test_split_trailing() {
        let history = range(ymd(2019, 6, 1), ymd(2024, 6, 1));
        let (split, test) = Split::trailing(history, 12).unwrap();

        assert_eq!(split.test.start(), ymd(2023, 6, 1));
        assert_eq!(split.test.end(), history.end());
        assert_eq!(split.pre.start(), history.start());
        assert_eq!(split.pre.end(), split.test.start());
        assert!(!split.pre.overlaps(&split.test));
        assert_eq!(test.range(), split.test);
    }

    #[test]
    fn test_split_without_pre() {
        let history = range(ymd(2023, 9, 1), ymd(2024, 6, 1));
        assert!(matches!(
            Split::trailing(history, 12),
            Err(WindowError::NoPreRange { .. })
        ));
    }

    #[test]
    fn test_trailing_history_ends_after_last_bar() {
        let last = Utc.with_ymd_and_hms(2024, 6, 28, 20, 0, 0).unwrap();
        let history = trailing_history(last, 2).unwrap();
        assert!(history.contains(last));
        assert_eq!(history.start(), Utc.with_ymd_and_hms(2022, 6, 28, 20, 0, 1).unwrap());
    }
}
