//! Composite scorecard and the deflated Sharpe diagnostic.

pub mod composer;

pub use composer::{
    clip01, linear, ScoreCategory, ScoreWeights, Scorecard, ScorecardComposer, ScorecardInputs, Subscores,
    SCORE_VERSION,
};
