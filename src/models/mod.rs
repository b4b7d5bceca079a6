pub mod record;
pub mod submission;
pub mod visa_type;

pub use record::{AttemptOutcome, ObservedRecord, PersistedState, TrackedIdentifier};
pub use submission::{RetryPolicy, RunRequest, SubmissionFields};
pub use visa_type::VisaType;
