//! Job-post lifecycle states and the transition table guarding them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use firelancer_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPostState {
    Draft,
    DraftDeleted,
    Requested,
    Rejected,
    Open,
    Closed,
}

impl JobPostState {
    pub const ALL: [JobPostState; 6] = [
        JobPostState::Draft,
        JobPostState::DraftDeleted,
        JobPostState::Requested,
        JobPostState::Rejected,
        JobPostState::Open,
        JobPostState::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobPostState::Draft => "DRAFT",
            JobPostState::DraftDeleted => "DRAFT_DELETED",
            JobPostState::Requested => "REQUESTED",
            JobPostState::Rejected => "REJECTED",
            JobPostState::Open => "OPEN",
            JobPostState::Closed => "CLOSED",
        }
    }
}

impl core::fmt::Display for JobPostState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobPostState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobPostState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown job post state: {s}")))
    }
}

/// Allowed `{from -> [to]}` edges of the job-post lifecycle.
///
/// Deployments swap the table to customise moderation, e.g.
/// [`JobPostProcess::without_moderation`] publishes straight to `OPEN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPostProcess {
    transitions: BTreeMap<JobPostState, Vec<JobPostState>>,
}

impl JobPostProcess {
    pub fn new(transitions: impl IntoIterator<Item = (JobPostState, Vec<JobPostState>)>) -> Self {
        Self {
            transitions: transitions.into_iter().collect(),
        }
    }

    /// Moderated workflow: published drafts wait for an administrator.
    pub fn moderated() -> Self {
        use JobPostState::*;
        Self::new([
            (Draft, vec![Requested, DraftDeleted]),
            (Requested, vec![Open, Rejected]),
            (Rejected, vec![Requested]),
            (Open, vec![Closed]),
        ])
    }

    /// Published drafts open immediately.
    pub fn without_moderation() -> Self {
        use JobPostState::*;
        Self::new([(Draft, vec![Open, DraftDeleted]), (Open, vec![Closed])])
    }

    pub fn next_states(&self, from: JobPostState) -> &[JobPostState] {
        self.transitions.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn can_transition(&self, from: JobPostState, to: JobPostState) -> bool {
        self.next_states(from).contains(&to)
    }

    /// `InvalidTransition` unless `from -> to` is in the table.
    pub fn check(&self, from: JobPostState, to: JobPostState) -> DomainResult<()> {
        if self.can_transition(from, to) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(from, to))
        }
    }
}

impl Default for JobPostProcess {
    fn default() -> Self {
        Self::moderated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobPostState::*;

    #[test]
    fn moderated_table_routes_publish_through_review() {
        let process = JobPostProcess::default();
        assert!(process.can_transition(Draft, Requested));
        assert!(!process.can_transition(Draft, Open));
        assert!(process.can_transition(Rejected, Requested));
        assert!(process.next_states(Closed).is_empty());
        assert!(process.next_states(DraftDeleted).is_empty());
    }

    #[test]
    fn check_reports_both_states() {
        let err = JobPostProcess::default().check(Closed, Open).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: "CLOSED".into(),
                to: "OPEN".into()
            }
        );
    }

    #[test]
    fn states_parse_case_insensitively() {
        assert_eq!("draft_deleted".parse::<JobPostState>().unwrap(), DraftDeleted);
        assert!("ARCHIVED".parse::<JobPostState>().is_err());
    }
}
