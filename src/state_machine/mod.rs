//! # Job State Machine
//!
//! Transition table and guards for the job lifecycle:
//!
//! ```text
//! queued -> processing -> completed
//!                      -> failed -> queued (retry, while retry_count < max_retries)
//! queued -> cancelled
//! processing -> cancelled
//! ```

pub mod errors;
pub mod events;
pub mod guards;
pub mod job_state_machine;
pub mod states;

pub use errors::{GuardResult, StateMachineError, StateMachineResult};
pub use events::JobEvent;
pub use guards::{ProgressGuard, RetryBudgetGuard, StateGuard};
pub use job_state_machine::JobStateMachine;
pub use states::JobStatus;
