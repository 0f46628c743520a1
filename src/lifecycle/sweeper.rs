use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::engine::{EngineError, ScheduleStore};
use crate::model::*;
use crate::observability::{
    SWEEPS_TOTAL, SWEEP_DURATION_SECONDS, SWEEP_GROUP_FAILURES_TOTAL, TRANSITIONS_TOTAL,
};

use super::RuleTable;

/// A rule row whose update failed. Retried on the next sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepGroupFailure {
    pub kind: Kind,
    pub from: Status,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Records advanced per kind. Every kind is present, zero included.
    pub advanced: BTreeMap<Kind, usize>,
    pub failed: Vec<SweepGroupFailure>,
}

impl SweepReport {
    fn new() -> Self {
        Self {
            advanced: Kind::ALL.into_iter().map(|k| (k, 0)).collect(),
            failed: Vec::new(),
        }
    }

    pub fn advanced(&self, kind: Kind) -> usize {
        self.advanced.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.advanced.values().sum()
    }
}

/// Applies the rule table to every due record, one set-based store update
/// per row.
pub struct LifecycleSweeper {
    store: Arc<dyn ScheduleStore>,
    rules: RuleTable,
}

impl LifecycleSweeper {
    pub fn new(store: Arc<dyn ScheduleStore>, rules: RuleTable) -> Result<Self, EngineError> {
        rules.validate()?;
        Ok(Self { store, rules })
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Advance everything due at `now`.
    ///
    /// Rows commit independently; a failed row is reported and left for the
    /// next sweep while the rest proceed. Calling again with the same or an
    /// earlier `now` moves nothing.
    pub async fn sweep(&self, now: Ms) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::new();

        for row in self.rules.rows() {
            match self.store.apply_rule_row(row, now).await {
                Ok(transitions) => {
                    if transitions.is_empty() {
                        continue;
                    }
                    for t in &transitions {
                        metrics::counter!(TRANSITIONS_TOTAL, "kind" => t.kind.label(), "to" => t.to.label())
                            .increment(1);
                        debug!("{} {} {} -> {}", t.kind, t.id, t.from, t.to);
                    }
                    *report.advanced.entry(row.kind).or_insert(0) += transitions.len();
                    info!("advanced {} {} record(s) out of {}", transitions.len(), row.kind, row.from);
                }
                Err(e) => {
                    let failure = EngineError::SweepGroupFailed {
                        kind: row.kind,
                        from: row.from,
                        reason: e.to_string(),
                    };
                    error!("{failure}");
                    metrics::counter!(SWEEP_GROUP_FAILURES_TOTAL, "kind" => row.kind.label())
                        .increment(1);
                    report.failed.push(SweepGroupFailure {
                        kind: row.kind,
                        from: row.from,
                        reason: e.to_string(),
                    });
                }
            }
        }

        metrics::counter!(SWEEPS_TOTAL).increment(1);
        metrics::histogram!(SWEEP_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        report
    }
}
