use std::sync::Arc;
use std::time::Duration;

use imc_client::{ClientCallbacks, FrameTree, ManualClock, SingleClient};
use imc_config::ClientConfig;
use imc_schemas::Pose;

use crate::builders::{t0, SERVER};
use crate::recorder::RecordingCallbacks;

/// A client wired to an in-memory frame tree, a manual clock and a recorder.
///
/// The default tree has `map -> base` (identity) so markers in either frame
/// resolve immediately.
pub struct Harness {
    pub tree: Arc<FrameTree>,
    pub clock: Arc<ManualClock>,
    pub recorder: Arc<RecordingCallbacks>,
    pub client: SingleClient,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        let recorder = Arc::new(RecordingCallbacks::new());
        Self::with_callbacks(config, recorder.clone(), recorder)
    }

    /// Target frame `map`, keep-alive `keep_alive_secs`.
    pub fn with_keep_alive(keep_alive_secs: u64) -> Self {
        Self::new(ClientConfig::for_target("map").with_keep_alive(Duration::from_secs(keep_alive_secs)))
    }

    /// Route callbacks through `callbacks` while still exposing `recorder`.
    pub fn with_callbacks(
        config: ClientConfig,
        recorder: Arc<RecordingCallbacks>,
        callbacks: Arc<dyn ClientCallbacks>,
    ) -> Self {
        let tree = Arc::new(FrameTree::new());
        tree.set_transform("map", "base", Pose::IDENTITY);
        let clock = Arc::new(ManualClock::new(t0()));
        let client =
            SingleClient::new(SERVER, config, tree.clone(), callbacks).with_clock(clock.clone());
        Self {
            tree,
            clock,
            recorder,
            client,
        }
    }

    pub fn sleep(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::with_keep_alive(10)
    }
}
