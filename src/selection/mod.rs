//! Frozen-parameter selection.
//!
//! `FILTER -> RANK -> (ACCEPT | FALLBACK) -> FROZEN`, ending in a handle that
//! can be spent exactly once on the held-out Test range.

pub mod frozen;
pub mod selector;

pub use frozen::{FrozenSelection, SelectionRecord, TestEvaluation};
pub use selector::{rank_order, RankedCandidate, SelectionError, SelectionRule, SelectionRuleRecord, Selector, SORT_KEYS};
