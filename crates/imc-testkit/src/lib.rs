//! Test support for marker clients: message builders, a recording callback
//! sink, a deterministic scenario harness, and recorded-session replay.

mod builders;
mod harness;
mod recorder;
pub mod session;

pub use builders::{diff, marker, pose_update, snapshot, t0, ts, SERVER};
pub use harness::Harness;
pub use recorder::{RecordedEvent, RecordingCallbacks};
pub use session::{load_session_json, replay, ReplayLine, Session, SessionStep};
