//! Transaction submission pipeline.
//!
//! # Data Flow
//! ```text
//! TransactionGroups
//!     → batch.rs (build, wallet sign-all, dispatch by SequencePolicy)
//!     → broadcaster.rs (send, resend every interval, await tracker)
//!     → confirmation.rs (timeout vs subscription vs polling)
//!     → diagnostics.rs (program log from simulation on failure)
//!     → BatchOutcome
//! ```
//!
//! # Design Decisions
//! - One signed payload per transaction, rebroadcast verbatim
//! - Background loops stop cooperatively and are awaited before returning
//! - Per-transaction failures are data, not errors of the batch call

pub mod batch;
pub mod broadcaster;
pub mod confirmation;
pub mod diagnostics;
pub mod error;

pub use batch::{
    BatchOutcome, BatchSubmitter, NoopObserver, SequencePolicy, SubmissionObserver,
    TransactionOutcome,
};
pub use broadcaster::{BroadcastSettings, ResilientBroadcaster, SendResult};
pub use confirmation::ConfirmationTracker;
pub use error::{SubmitError, SubmitResult};
