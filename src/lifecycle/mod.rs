//! Time-driven status lifecycle: a declarative rule table and the sweeper
//! that applies it.

mod rules;
mod sweeper;

pub use rules::{Condition, Rule, RuleRow, RuleTable, DEFAULT_LEAD_WINDOW_MS};
pub use sweeper::{LifecycleSweeper, SweepGroupFailure, SweepReport};
