#![forbid(unsafe_code)]

pub mod buffer;
pub mod countdown;
pub mod model;
pub mod phase;
pub mod time;

pub use buffer::{AnswerBuffer, BufferError};
pub use countdown::{Countdown, Tick, Urgency, format_clock};
pub use phase::{PhaseError, SessionPhase, SubmitTrigger};
pub use time::Clock;
