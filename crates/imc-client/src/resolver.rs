//! Transform provider boundary.
//!
//! The client never owns a transform tree; it only asks "can frame F be
//! expressed in target frame T at time t, and with what pose?".

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use imc_config::FailureCause;
use imc_schemas::{Header, Pose};

/// Time at which a transform is requested.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransformTime {
    /// Most recent transform available.
    Latest,
    At(DateTime<Utc>),
}

impl TransformTime {
    pub fn of(header: &Header) -> Self {
        match header.stamp {
            Some(t) => TransformTime::At(t),
            None => TransformTime::Latest,
        }
    }
}

impl fmt::Display for TransformTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformTime::Latest => write!(f, "latest"),
            TransformTime::At(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// One distinct (frame, time) pair a message depends on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameQuery {
    pub frame: String,
    pub at: TransformTime,
}

impl FrameQuery {
    pub fn new(frame: impl Into<String>, at: TransformTime) -> Self {
        Self {
            frame: frame.into(),
            at,
        }
    }

    pub fn of(header: &Header) -> Self {
        Self::new(header.frame_id.clone(), TransformTime::of(header))
    }
}

/// A resolver's negative answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformFailure {
    pub cause: FailureCause,
    pub detail: String,
}

impl TransformFailure {
    pub fn new(cause: FailureCause, detail: impl Into<String>) -> Self {
        Self {
            cause,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cause.as_str(), self.detail)
    }
}

impl std::error::Error for TransformFailure {}

/// Narrow query interface onto a transform provider.
///
/// The returned pose maps `frame` into `target_frame` (i.e. composing it
/// with a pose given in `frame` yields that pose in `target_frame`).
///
/// Implementations may block briefly. They may call back into the client's
/// ingest operations; they must not call `advance()` from another thread
/// and wait on it.
pub trait TransformResolver: Send + Sync {
    fn transform(
        &self,
        frame: &str,
        target_frame: &str,
        at: TransformTime,
    ) -> Result<Pose, TransformFailure>;

    fn can_transform(&self, frame: &str, target_frame: &str, at: TransformTime) -> bool {
        self.transform(frame, target_frame, at).is_ok()
    }
}

impl<T: TransformResolver + ?Sized> TransformResolver for Arc<T> {
    fn transform(
        &self,
        frame: &str,
        target_frame: &str,
        at: TransformTime,
    ) -> Result<Pose, TransformFailure> {
        (**self).transform(frame, target_frame, at)
    }

    fn can_transform(&self, frame: &str, target_frame: &str, at: TransformTime) -> bool {
        (**self).can_transform(frame, target_frame, at)
    }
}
