//! Transient vs permanent classification of transform failures.
//!
//! A resolver only reports *what* went wrong ([`FailureCause`]). Whether the
//! client keeps retrying or resets is decided here, per deployment.

use serde::{Deserialize, Serialize};

/// Why a frame could not be expressed in the target frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Frame known but no transform received yet.
    NotYetAvailable,
    /// Requested time lies outside the buffered transform history.
    Extrapolation,
    /// Both frames exist but are in unconnected trees.
    Disconnected,
    /// Frame has never been seen.
    UnknownFrame,
    /// Frame explicitly reported extinct / invalid by the provider.
    InvalidFrame,
    /// Any other provider-side lookup error.
    Lookup,
}

impl FailureCause {
    pub const ALL: [FailureCause; 6] = [
        FailureCause::NotYetAvailable,
        FailureCause::Extrapolation,
        FailureCause::Disconnected,
        FailureCause::UnknownFrame,
        FailureCause::InvalidFrame,
        FailureCause::Lookup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::NotYetAvailable => "not_yet_available",
            FailureCause::Extrapolation => "extrapolation",
            FailureCause::Disconnected => "disconnected",
            FailureCause::UnknownFrame => "unknown_frame",
            FailureCause::InvalidFrame => "invalid_frame",
            FailureCause::Lookup => "lookup",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retry on every advance until success or keep-alive expiry.
    Transient,
    /// Surface once and reset the client.
    Permanent,
}

/// Per-cause classification. Missing keys take the default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FailureClassification {
    pub not_yet_available: FailureKind,
    pub extrapolation: FailureKind,
    pub disconnected: FailureKind,
    pub unknown_frame: FailureKind,
    pub invalid_frame: FailureKind,
    pub lookup: FailureKind,
}

impl Default for FailureClassification {
    /// Only an explicitly invalid frame is permanent.
    fn default() -> Self {
        Self {
            not_yet_available: FailureKind::Transient,
            extrapolation: FailureKind::Transient,
            disconnected: FailureKind::Transient,
            unknown_frame: FailureKind::Transient,
            invalid_frame: FailureKind::Permanent,
            lookup: FailureKind::Transient,
        }
    }
}

impl FailureClassification {
    pub fn kind_of(&self, cause: FailureCause) -> FailureKind {
        match cause {
            FailureCause::NotYetAvailable => self.not_yet_available,
            FailureCause::Extrapolation => self.extrapolation,
            FailureCause::Disconnected => self.disconnected,
            FailureCause::UnknownFrame => self.unknown_frame,
            FailureCause::InvalidFrame => self.invalid_frame,
            FailureCause::Lookup => self.lookup,
        }
    }

    pub fn is_permanent(&self, cause: FailureCause) -> bool {
        self.kind_of(cause) == FailureKind::Permanent
    }

    /// Same classification with one cause overridden.
    pub fn with(mut self, cause: FailureCause, kind: FailureKind) -> Self {
        match cause {
            FailureCause::NotYetAvailable => self.not_yet_available = kind,
            FailureCause::Extrapolation => self.extrapolation = kind,
            FailureCause::Disconnected => self.disconnected = kind,
            FailureCause::UnknownFrame => self.unknown_frame = kind,
            FailureCause::InvalidFrame => self.invalid_frame = kind,
            FailureCause::Lookup => self.lookup = kind,
        }
        self
    }
}
