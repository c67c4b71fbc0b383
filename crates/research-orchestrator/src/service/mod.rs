//! Research-job services: compose, submit, and poll.

pub mod composer;
pub mod poll;
pub mod prompt;
pub mod submitter;

pub use composer::{ComposeError, ComposeRequest, Composer};
pub use poll::{retry_after_secs, Clock, PollCoordinator, PollRequest, SystemClock};
pub use submitter::{SubmitError, SubmitRequest, Submitter};
