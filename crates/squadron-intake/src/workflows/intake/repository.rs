use super::domain::{ApplicationRecord, ApplicationStatus, UserId};

/// Storage abstraction for completed applications.
///
/// Implementations must serialize every writer: `append` and `update_status` never interleave
/// with each other against the same backing resource.
pub trait ApplicationRepository: Send + Sync {
    /// Stores a finished application. Fails with `DuplicateApplicant` when the applicant
    /// already has a non-terminal record.
    fn append(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;

    /// Every record, in insertion order.
    fn list_all(&self) -> Result<Vec<ApplicationRecord>, RepositoryError>;

    /// All records in `status`, in insertion order.
    fn list_by_status(
        &self,
        status: ApplicationStatus,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;

    /// The applicant's open record if there is one, otherwise their most recent record.
    fn fetch(&self, applicant: UserId) -> Result<Option<ApplicationRecord>, RepositoryError>;

    /// Moves the applicant's open record to `status`, returning the updated record.
    fn update_status(
        &self,
        applicant: UserId,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("applicant {0} already has an application awaiting review")]
    DuplicateApplicant(UserId),
    #[error("no open application for applicant {0}")]
    NotFound(UserId),
    #[error("cannot move application from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("application store row {row} is malformed: {reason}")]
    Malformed { row: usize, reason: String },
    #[error("application store columns do not match the question catalog")]
    SchemaMismatch,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(value: std::io::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}

impl From<csv::Error> for RepositoryError {
    fn from(value: csv::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}

/// Shared selection rule for `fetch`: prefer the open record, fall back to the latest one.
pub(crate) fn select_for_applicant<'a, I>(records: I, applicant: UserId) -> Option<&'a ApplicationRecord>
where
    I: DoubleEndedIterator<Item = &'a ApplicationRecord> + Clone,
{
    let mut matching = records.filter(move |record| record.applicant_id == applicant);
    matching
        .clone()
        .rev()
        .find(|record| !record.status.is_terminal())
        .or_else(|| matching.next_back())
}

pub(crate) fn check_transition(
    from: ApplicationStatus,
    to: ApplicationStatus,
) -> Result<(), RepositoryError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidTransition { from, to })
    }
}
