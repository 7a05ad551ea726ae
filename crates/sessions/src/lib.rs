//! Session runtime bookkeeping: the registry of live interview
//! sessions, the per-session handle (mailbox, cancel token, transcript
//! accumulator, turn and warning logs), and the transcript merge rules.

pub mod accumulator;
pub mod cancel;
pub mod handle;
pub mod registry;
pub mod turns;
pub mod warnings;

pub use accumulator::TranscriptAccumulator;
pub use cancel::CancelToken;
pub use handle::{JobContext, SessionHandle, SessionState};
pub use registry::SessionRegistry;
pub use turns::TurnLog;
pub use warnings::WarningLog;
