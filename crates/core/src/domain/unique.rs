// Uniqueness options for insertion.

use crate::domain::job::JobState;

/// Which facets of the candidate job participate in the uniqueness match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Worker,
    Queue,
    Args,
}

/// How far back `inserted_at` is allowed to reach for a conflicting row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniquePeriod {
    Seconds(i64),
    Infinity,
}

/// `{fields?, keys?, period?, states?}`. Every default is
/// named here; nothing is implicit.
#[derive(Debug, Clone)]
pub struct UniqueOptions {
    pub fields: Vec<UniqueField>,
    /// When set and `Args` is in `fields`, only these top-level keys of
    /// `args` are compared instead of the whole JSON value.
    pub keys: Option<Vec<String>>,
    pub period: UniquePeriod,
    pub states: Vec<JobState>,
}

impl Default for UniqueOptions {
    fn default() -> Self {
        Self {
            fields: vec![UniqueField::Worker, UniqueField::Queue, UniqueField::Args],
            keys: None,
            period: UniquePeriod::Seconds(60),
            states: vec![
                JobState::Available,
                JobState::Scheduled,
                JobState::Executing,
                JobState::Retryable,
            ],
        }
    }
}

impl UniqueOptions {
    pub fn has_field(&self, field: UniqueField) -> bool {
        self.fields.contains(&field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = UniqueOptions::default();
        assert!(opts.has_field(UniqueField::Worker));
        assert!(opts.has_field(UniqueField::Queue));
        assert!(opts.has_field(UniqueField::Args));
        assert!(matches!(opts.period, UniquePeriod::Seconds(60)));
        assert_eq!(opts.states.len(), 4);
    }
}
