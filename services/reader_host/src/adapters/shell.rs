//! services/reader_host/src/adapters/shell.rs
//!
//! Adapters backed by the native shell connected over `/shell/ws`. The shell
//! owns the real ad SDK and the platform screen-capture switch; the host only
//! sends it commands. When no shell is connected every command fails, which
//! the ad gateway treats as "ad not available".

use async_trait::async_trait;
use note_access_core::gateway::AdUnitConfig;
use note_access_core::ports::{AdSdk, PortError, PortResult, ScreenCapture};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::web::protocol::{AdUnitKind, HostMessage};

/// Fan-out channel from the host to whichever shell is connected.
pub struct ShellBridge {
    commands: broadcast::Sender<HostMessage>,
}

impl ShellBridge {
    pub fn new(capacity: usize) -> Self {
        let (commands, _) = broadcast::channel(capacity);
        Self { commands }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostMessage> {
        self.commands.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.commands.receiver_count() > 0
    }

    pub fn send(&self, message: HostMessage) -> PortResult<()> {
        self.commands
            .send(message)
            .map(|_| ())
            .map_err(|_| PortError::Unexpected("No native shell connected".to_string()))
    }
}

//=========================================================================================
// `AdSdk` over the shell
//=========================================================================================

/// An adapter that implements the `AdSdk` port for one ad unit.
pub struct ShellAdSdk {
    kind: AdUnitKind,
    unit: AdUnitConfig,
    bridge: Arc<ShellBridge>,
}

impl ShellAdSdk {
    pub fn new(kind: AdUnitKind, unit: AdUnitConfig, bridge: Arc<ShellBridge>) -> Self {
        Self { kind, unit, bridge }
    }
}

#[async_trait]
impl AdSdk for ShellAdSdk {
    async fn load(&self) -> PortResult<()> {
        self.bridge.send(HostMessage::LoadAd {
            unit: self.kind,
            unit_id: self.unit.unit_id.clone(),
            keywords: self.unit.keywords.clone(),
        })
    }

    async fn show(&self) -> PortResult<()> {
        self.bridge.send(HostMessage::ShowAd { unit: self.kind })
    }
}

//=========================================================================================
// `ScreenCapture` over the shell
//=========================================================================================

pub struct ShellScreenCapture {
    bridge: Arc<ShellBridge>,
}

impl ShellScreenCapture {
    pub fn new(bridge: Arc<ShellBridge>) -> Self {
        Self { bridge }
    }
}

impl ScreenCapture for ShellScreenCapture {
    fn prevent(&self) {
        if let Err(e) = self.bridge.send(HostMessage::PreventScreenCapture) {
            warn!("Could not request screen-capture prevention: {}", e);
        }
    }

    fn allow(&self) {
        if let Err(e) = self.bridge.send(HostMessage::AllowScreenCapture) {
            warn!("Could not lift screen-capture prevention: {}", e);
        }
    }
}
