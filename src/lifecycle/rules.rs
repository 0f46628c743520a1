use std::collections::HashSet;

use crate::engine::EngineError;
use crate::model::*;

/// Lead window applied to class sessions that carry none of their own.
pub const DEFAULT_LEAD_WINDOW_MS: Ms = 7 * DAY_MS;

/// A pure predicate over `(now, record)`.
///
/// A record without an end anchor never reaches its end: end-bounded
/// conditions are false and "before end" is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// `start - lead <= now < start`. `default_lead` applies when the record has no lead window.
    WithinLeadWindow { default_lead: Ms },
    /// `start <= now < end`
    InsideWindowHalfOpen,
    /// `start <= now <= end`
    InsideWindowClosed,
    /// `now >= end`
    ReachedEnd,
    /// `now > end`
    PassedEnd,
}

impl Condition {
    pub fn holds(&self, now: Ms, record: &LifecycleRecord) -> bool {
        let start = record.start_anchor;
        match *self {
            Condition::WithinLeadWindow { default_lead } => {
                let lead = record.lead_window.unwrap_or(default_lead);
                now < start && now >= start.saturating_sub(lead)
            }
            Condition::InsideWindowHalfOpen => {
                now >= start && record.end_anchor.is_none_or(|end| now < end)
            }
            Condition::InsideWindowClosed => {
                now >= start && record.end_anchor.is_none_or(|end| now <= end)
            }
            Condition::ReachedEnd => record.end_anchor.is_some_and(|end| now >= end),
            Condition::PassedEnd => record.end_anchor.is_some_and(|end| now > end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub condition: Condition,
    pub to: Status,
}

impl Rule {
    pub fn new(condition: Condition, to: Status) -> Self {
        Self { condition, to }
    }
}

/// Ordered rules for records of `kind` in status `from`. First match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRow {
    pub kind: Kind,
    pub from: Status,
    pub rules: Vec<Rule>,
}

impl RuleRow {
    pub fn new(kind: Kind, from: Status, rules: Vec<Rule>) -> Self {
        Self { kind, from, rules }
    }

    /// Target status for `record` at `now`, or `None` if this row does not
    /// apply to it or no condition holds.
    pub fn evaluate(&self, now: Ms, record: &LifecycleRecord) -> Option<Status> {
        if record.kind != self.kind || record.status != self.from {
            return None;
        }
        self.rules
            .iter()
            .find(|r| r.condition.holds(now, record))
            .map(|r| r.to)
    }

    /// How many of this row's conditions hold. The standard table keeps this at most one.
    pub fn matching_count(&self, now: Ms, record: &LifecycleRecord) -> usize {
        self.rules.iter().filter(|r| r.condition.holds(now, record)).count()
    }
}

/// Declarative `(kind, from) -> [(condition, to)]` table driving the sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rows: Vec<RuleRow>,
}

impl RuleTable {
    pub fn new(rows: Vec<RuleRow>) -> Result<Self, EngineError> {
        let table = Self { rows };
        table.validate()?;
        Ok(table)
    }

    /// Quiz and class-session rules. `lead_window` is the class-session
    /// default for records without their own.
    pub fn standard(lead_window: Ms) -> Self {
        use Condition::*;
        use Kind::*;
        use Status::*;

        let lead = WithinLeadWindow { default_lead: lead_window };
        Self {
            rows: vec![
                RuleRow::new(
                    QuizSession,
                    Upcoming,
                    vec![Rule::new(InsideWindowHalfOpen, Ongoing), Rule::new(ReachedEnd, Finished)],
                ),
                RuleRow::new(QuizSession, Ongoing, vec![Rule::new(ReachedEnd, Finished)]),
                RuleRow::new(
                    ClassSession,
                    Recruiting,
                    vec![
                        Rule::new(lead, Upcoming),
                        Rule::new(InsideWindowClosed, Active),
                        Rule::new(PassedEnd, Finished),
                    ],
                ),
                RuleRow::new(
                    ClassSession,
                    Upcoming,
                    vec![Rule::new(InsideWindowClosed, Active), Rule::new(PassedEnd, Finished)],
                ),
                RuleRow::new(ClassSession, Active, vec![Rule::new(PassedEnd, Finished)]),
            ],
        }
    }

    pub fn rows(&self) -> &[RuleRow] {
        &self.rows
    }

    pub fn row(&self, kind: Kind, from: Status) -> Option<&RuleRow> {
        self.rows.iter().find(|r| r.kind == kind && r.from == from)
    }

    /// Forward-only check: every rule must move a record strictly later in
    /// its kind's order, never into or out of `Cancelled`, and each
    /// `(kind, from)` appears once.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| Err(EngineError::InvalidRuleTable(msg));
        let mut seen = HashSet::new();
        for row in &self.rows {
            let (kind, from) = (row.kind, row.from);
            if !seen.insert((kind, from)) {
                return invalid(format!("duplicate row {kind}/{from}"));
            }
            let Some(from_rank) = kind.rank(from) else {
                return invalid(format!("{from} is not a {kind} status"));
            };
            if from == Status::Cancelled {
                return invalid(format!("{kind}/{from} is terminal"));
            }
            if row.rules.is_empty() {
                return invalid(format!("row {kind}/{from} has no rules"));
            }
            for rule in &row.rules {
                let to = rule.to;
                if to == Status::Cancelled {
                    return invalid(format!("{kind}/{from} -> {to}: cancellation is operator-only"));
                }
                match kind.rank(to) {
                    Some(to_rank) if to_rank > from_rank => {}
                    Some(_) => return invalid(format!("{kind}/{from} -> {to} moves backward")),
                    None => return invalid(format!("{to} is not a {kind} status")),
                }
                if let Condition::WithinLeadWindow { default_lead } = rule.condition
                    && default_lead < 0
                {
                    return invalid(format!("negative lead window {default_lead}ms"));
                }
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, now: Ms, record: &LifecycleRecord) -> Option<Status> {
        self.row(record.kind, record.status)?.evaluate(now, record)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard(DEFAULT_LEAD_WINDOW_MS)
    }
}
