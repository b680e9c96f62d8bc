//! crates/note_access_core/src/gateway.rs
//!
//! The ad gateway: owns the lifecycle of a single ad unit (preload, show,
//! teardown) on top of the `AdSdk` port and turns the SDK's event stream into
//! a single awaitable "was a reward earned?" answer.
//!
//! Fail-open: when the ad is not ready, or the SDK reports an error while it
//! is showing, the caller is told the reward was earned. Content is never
//! blocked behind ad-infrastructure flakiness.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ports::{AdEvent, AdSdk};

/// Keywords attached to every ad request.
pub const DEFAULT_AD_KEYWORDS: [&str; 4] = ["education", "exam", "study", "learning"];

/// Static description of the ad unit a gateway serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdUnitConfig {
    pub unit_id: String,
    pub keywords: Vec<String>,
}

impl AdUnitConfig {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            keywords: DEFAULT_AD_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdPhase {
    Idle,
    Loading,
    Loaded,
    Showing,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GatewayError {
    /// A second show was requested while the first one is still on screen.
    #[error("an ad is already being shown")]
    ShowInProgress,
    /// The gateway was torn down before the ad reported a result.
    #[error("the ad gateway was torn down while an ad was showing")]
    TornDown,
}

//=========================================================================================
// Seams consumed by the orchestrator
//=========================================================================================

/// Something that can ask the user to watch a rewarded ad.
#[async_trait]
pub trait RewardSource: Send + Sync {
    async fn show_for_reward(&self) -> Result<bool, GatewayError>;
}

/// Something that can show a plain interstitial and report when it is gone.
#[async_trait]
pub trait InterstitialSource: Send + Sync {
    async fn show_interstitial(&self) -> Result<(), GatewayError>;
}

//=========================================================================================
// The gateway
//=========================================================================================

struct GatewayInner {
    phase: AdPhase,
    reward_earned: bool,
    /// Single-slot resolver for the caller currently waiting on a show.
    pending: Option<oneshot::Sender<bool>>,
}

pub struct AdGateway {
    sdk: Arc<dyn AdSdk>,
    unit: AdUnitConfig,
    inner: Mutex<GatewayInner>,
}

impl AdGateway {
    pub fn new(sdk: Arc<dyn AdSdk>, unit: AdUnitConfig) -> Self {
        Self {
            sdk,
            unit,
            inner: Mutex::new(GatewayInner {
                phase: AdPhase::Idle,
                reward_earned: false,
                pending: None,
            }),
        }
    }

    pub fn unit(&self) -> &AdUnitConfig {
        &self.unit
    }

    pub async fn phase(&self) -> AdPhase {
        self.inner.lock().await.phase
    }

    /// Requests an ad from the SDK unless one is already loading, loaded or showing.
    pub async fn preload(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.phase != AdPhase::Idle {
                return;
            }
            inner.phase = AdPhase::Loading;
        }

        debug!(unit = %self.unit.unit_id, "Requesting ad load.");
        if let Err(e) = self.sdk.load().await {
            warn!(unit = %self.unit.unit_id, "Ad load request failed: {}", e);
            let mut inner = self.inner.lock().await;
            if inner.phase == AdPhase::Loading {
                inner.phase = AdPhase::Idle;
            }
        }
    }

    /// Shows the ad and resolves to whether the user earned the reward.
    ///
    /// Resolves `true` right away (and starts a preload) when no ad is loaded.
    pub async fn show_for_reward(&self) -> Result<bool, GatewayError> {
        match self.begin_show().await? {
            Some(receiver) => self.finish_show(receiver).await,
            None => {
                info!(unit = %self.unit.unit_id, "Ad not ready; granting without reward.");
                self.preload().await;
                Ok(true)
            }
        }
    }

    /// Shows the ad as a plain interstitial. Completes immediately when no ad
    /// is loaded.
    pub async fn show(&self) -> Result<(), GatewayError> {
        match self.begin_show().await? {
            Some(receiver) => self.finish_show(receiver).await.map(|_| ()),
            None => {
                debug!(unit = %self.unit.unit_id, "Interstitial not ready; skipping.");
                Ok(())
            }
        }
    }

    /// Feeds one SDK signal into the state machine.
    pub async fn handle_event(&self, event: AdEvent) {
        let mut reload = false;
        {
            let mut inner = self.inner.lock().await;
            match event {
                AdEvent::Loaded => {
                    if inner.phase != AdPhase::Showing {
                        inner.phase = AdPhase::Loaded;
                    }
                }
                AdEvent::Error(message) => {
                    warn!(unit = %self.unit.unit_id, "Ad SDK error: {}", message);
                    inner.phase = AdPhase::Idle;
                    inner.reward_earned = false;
                    if let Some(resolve) = inner.pending.take() {
                        let _ = resolve.send(true);
                    }
                }
                AdEvent::EarnedReward => {
                    inner.reward_earned = true;
                }
                AdEvent::Opened => {
                    debug!(unit = %self.unit.unit_id, "Ad opened.");
                }
                AdEvent::Closed => {
                    inner.phase = AdPhase::Idle;
                    let earned = inner.reward_earned;
                    if let Some(resolve) = inner.pending.take() {
                        let _ = resolve.send(earned);
                    }
                    inner.reward_earned = false;
                    reload = true;
                }
            }
        }

        if reload {
            self.preload().await;
        }
    }

    /// Forwards every event from `events` into the gateway until the channel closes.
    pub fn spawn_event_pump(self: Arc<Self>, mut events: mpsc::Receiver<AdEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle_event(event).await;
            }
            debug!(unit = %self.unit.unit_id, "Ad event stream ended.");
        })
    }

    /// Drops any waiting caller and forgets the loaded ad.
    pub async fn teardown(&self) {
        let mut inner = self.inner.lock().await;
        inner.pending = None;
        inner.phase = AdPhase::Idle;
        inner.reward_earned = false;
    }

    async fn begin_show(&self) -> Result<Option<oneshot::Receiver<bool>>, GatewayError> {
        let mut inner = self.inner.lock().await;
        // The previous caller went away; its ad may still be on screen.
        if inner.pending.as_ref().is_some_and(|resolve| resolve.is_closed()) {
            debug!(unit = %self.unit.unit_id, "Reclaiming show slot from an abandoned caller.");
            inner.pending = None;
        }
        if inner.pending.is_some() {
            return Err(GatewayError::ShowInProgress);
        }
        if inner.phase != AdPhase::Loaded {
            return Ok(None);
        }
        let (resolve, receiver) = oneshot::channel();
        inner.reward_earned = false;
        inner.pending = Some(resolve);
        inner.phase = AdPhase::Showing;
        Ok(Some(receiver))
    }

    async fn finish_show(&self, receiver: oneshot::Receiver<bool>) -> Result<bool, GatewayError> {
        if let Err(e) = self.sdk.show().await {
            warn!(unit = %self.unit.unit_id, "Ad show request failed: {}", e);
            let mut inner = self.inner.lock().await;
            inner.pending = None;
            inner.phase = AdPhase::Idle;
            return Ok(true);
        }
        receiver.await.map_err(|_| GatewayError::TornDown)
    }
}

#[async_trait]
impl RewardSource for AdGateway {
    async fn show_for_reward(&self) -> Result<bool, GatewayError> {
        AdGateway::show_for_reward(self).await
    }
}

#[async_trait]
impl InterstitialSource for AdGateway {
    async fn show_interstitial(&self) -> Result<(), GatewayError> {
        self.show().await
    }
}
