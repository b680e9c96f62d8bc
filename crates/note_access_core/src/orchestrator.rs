//! crates/note_access_core/src/orchestrator.rs
//!
//! Composes the access policy, the ad gateway and the persisted access state
//! into the operations screens actually call.
//!
//! Ordering is always: pure policy check, then the (suspending) ad, then a
//! state write, and the write only happens once a reward is confirmed. A
//! declined ad leaves the persisted state untouched.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{AccessState, NoteId};
use crate::gateway::{GatewayError, InterstitialSource, RewardSource};
use crate::policy::{decide_download_access, decide_view_access, should_show_practice_interstitial};
use crate::ports::{AccessStateStore, Clock, PortError};

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Access state error: {0}")]
    Store(#[from] PortError),
    #[error("Ad gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

pub struct AccessOrchestrator {
    store: Arc<dyn AccessStateStore>,
    clock: Arc<dyn Clock>,
    rewards: Arc<dyn RewardSource>,
    interstitials: Option<Arc<dyn InterstitialSource>>,
    /// Serializes gated operations so the gateway never sees two shows at once.
    gate: Mutex<()>,
}

impl AccessOrchestrator {
    pub fn new(
        store: Arc<dyn AccessStateStore>,
        clock: Arc<dyn Clock>,
        rewards: Arc<dyn RewardSource>,
    ) -> Self {
        Self {
            store,
            clock,
            rewards,
            interstitials: None,
            gate: Mutex::new(()),
        }
    }

    pub fn with_interstitials(mut self, interstitials: Arc<dyn InterstitialSource>) -> Self {
        self.interstitials = Some(interstitials);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn access_state(&self) -> Result<AccessState, AccessError> {
        Ok(self.store.load().await?)
    }

    /// Grants viewing, asking for at most one reward ad per calendar day.
    pub async fn ensure_view_access(&self, note_id: NoteId) -> Result<bool, AccessError> {
        let _gate = self.gate.lock().await;
        let today = self.clock.today();
        let state = self.store.load().await?;
        if decide_view_access(note_id, &state, today) {
            debug!(%note_id, "View access already granted.");
            return Ok(true);
        }

        let rewarded = self.rewards.show_for_reward().await?;
        if !rewarded {
            info!(%note_id, "View ad closed before the reward; access denied.");
            return Ok(false);
        }

        // Reload in case another writer touched the state while the ad was up.
        let mut state = self.store.load().await?;
        state.last_view_ad_date = Some(today);
        self.store.save(&state).await?;
        info!(%note_id, %today, "Daily view pass unlocked.");
        Ok(true)
    }

    /// Grants downloading. Every not-yet-downloaded note needs its own reward.
    pub async fn ensure_download_access(&self, note_id: NoteId) -> Result<bool, AccessError> {
        let _gate = self.gate.lock().await;
        let state = self.store.load().await?;
        if decide_download_access(note_id, &state) {
            debug!(%note_id, "Download access already granted.");
            return Ok(true);
        }

        let rewarded = self.rewards.show_for_reward().await?;
        if !rewarded {
            info!(%note_id, "Download ad closed before the reward; access denied.");
            return Ok(false);
        }

        let mut state = self.store.load().await?;
        if state.mark_downloaded(note_id) {
            self.store.save(&state).await?;
        }
        info!(%note_id, "Note permanently unlocked.");
        Ok(true)
    }

    pub async fn is_downloaded(&self, note_id: NoteId) -> Result<bool, AccessError> {
        Ok(self.store.load().await?.is_downloaded(note_id))
    }

    /// Called by the billing collaborator when the premium entitlement changes.
    pub async fn set_premium(&self, is_premium: bool) -> Result<AccessState, AccessError> {
        let _gate = self.gate.lock().await;
        let mut state = self.store.load().await?;
        if state.is_premium != is_premium {
            state.is_premium = is_premium;
            self.store.save(&state).await?;
            info!(is_premium, "Premium status changed.");
        }
        Ok(state)
    }

    /// Shows an interstitial after a mock test, unless the user is premium.
    /// Returns whether an ad was attempted.
    pub async fn show_after_mock_test(&self) -> Result<bool, AccessError> {
        let _gate = self.gate.lock().await;
        if self.store.load().await?.is_premium {
            return Ok(false);
        }
        self.show_interstitial().await
    }

    /// Records a finished practice session and shows an interstitial on every
    /// second one. Premium users neither see ads nor advance the counter.
    pub async fn show_after_practice(&self) -> Result<bool, AccessError> {
        let _gate = self.gate.lock().await;
        let mut state = self.store.load().await?;
        if state.is_premium {
            return Ok(false);
        }
        state.practice_session_count = state.practice_session_count.saturating_add(1);
        self.store.save(&state).await?;

        if !should_show_practice_interstitial(state.practice_session_count) {
            return Ok(false);
        }
        self.show_interstitial().await
    }

    async fn show_interstitial(&self) -> Result<bool, AccessError> {
        match &self.interstitials {
            Some(ads) => {
                ads.show_interstitial().await?;
                Ok(true)
            }
            None => {
                debug!("No interstitial unit configured.");
                Ok(false)
            }
        }
    }
}
