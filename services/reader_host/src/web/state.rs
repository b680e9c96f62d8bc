//! services/reader_host/src/web/state.rs
//!
//! Defines the host's shared state and the per-note reader state.

use crate::adapters::{ShellAdSdk, ShellBridge, ShellScreenCapture};
use crate::config::Config;
use crate::web::protocol::AdUnitKind;
use note_access_core::domain::NoteId;
use note_access_core::gateway::{AdGateway, AdUnitConfig};
use note_access_core::orchestrator::AccessOrchestrator;
use note_access_core::ports::{AccessStateStore, AdEvent, Clock, NoteBackend, ScreenCapture};
use note_access_core::reader::{OpenViewer, ReaderSession};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SHELL_COMMAND_BUFFER: usize = 32;
const AD_EVENT_BUFFER: usize = 32;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<AccessOrchestrator>,
    pub backend: Arc<dyn NoteBackend>,
    pub screen_capture: Arc<dyn ScreenCapture>,
    pub shell: Arc<ShellBridge>,
    pub rewarded_ads: Arc<AdGateway>,
    pub interstitial_ads: Arc<AdGateway>,
    pub rewarded_events: mpsc::Sender<AdEvent>,
    pub interstitial_events: mpsc::Sender<AdEvent>,
    pub readers: Mutex<ReaderRegistry>,
}

impl AppState {
    pub fn new_reader(&self) -> ReaderSession {
        ReaderSession::new(
            self.orchestrator.clone(),
            self.backend.clone(),
            self.screen_capture.clone(),
        )
    }

    /// Routes an SDK event relayed by the shell to the matching gateway.
    pub async fn dispatch_ad_event(&self, unit: AdUnitKind, event: AdEvent) {
        let events = match unit {
            AdUnitKind::Rewarded => &self.rewarded_events,
            AdUnitKind::Interstitial => &self.interstitial_events,
        };
        if events.send(event).await.is_err() {
            warn!(?unit, "Ad event pump is gone; dropping event.");
        }
    }

    /// Fails open whatever the departed shell was loading or showing, unless
    /// another shell is still connected. Returns whether the gateways were
    /// reset.
    pub async fn shell_disconnected(&self) -> bool {
        if self.shell.is_connected() {
            info!("Another native shell is still connected; keeping ad state.");
            return false;
        }
        for unit in [AdUnitKind::Rewarded, AdUnitKind::Interstitial] {
            self.dispatch_ad_event(unit, AdEvent::Error("native shell disconnected".to_string()))
                .await;
        }
        true
    }

    /// Asks both gateways to have an ad ready.
    pub async fn preload_ads(&self) {
        self.rewarded_ads.preload().await;
        self.interstitial_ads.preload().await;
    }
}

//=========================================================================================
// ReaderRegistry (One Entry Per Open Note Screen)
//=========================================================================================

/// Tracks readers that are opening or open. Removing an entry is the host's
/// equivalent of the screen unmounting.
#[derive(Default)]
pub struct ReaderRegistry {
    next_ticket: u64,
    opening: HashMap<NoteId, (u64, CancellationToken)>,
    open: HashMap<NoteId, OpenViewer>,
}

impl ReaderRegistry {
    /// Registers a reader that is about to open, unmounting any previous one
    /// for the same note. The returned ticket identifies this open attempt.
    pub fn begin_open(&mut self, note_id: NoteId, unmount: CancellationToken) -> u64 {
        self.close(note_id);
        self.next_ticket += 1;
        self.opening.insert(note_id, (self.next_ticket, unmount));
        self.next_ticket
    }

    /// Stores the finished viewer if this attempt is still the current one.
    /// Returns `false` when the viewer was discarded.
    pub fn finish_open(&mut self, note_id: NoteId, ticket: u64, viewer: OpenViewer) -> bool {
        let current = matches!(
            self.opening.get(&note_id),
            Some((t, unmount)) if *t == ticket && !unmount.is_cancelled()
        );
        if !current {
            return false;
        }
        self.opening.remove(&note_id);
        self.open.insert(note_id, viewer);
        true
    }

    /// Forgets a failed attempt, leaving newer attempts alone.
    pub fn abandon_open(&mut self, note_id: NoteId, ticket: u64) {
        if matches!(self.opening.get(&note_id), Some((current, _)) if *current == ticket) {
            self.opening.remove(&note_id);
        }
    }

    pub fn is_opening(&self, note_id: NoteId) -> bool {
        self.opening.contains_key(&note_id)
    }

    pub fn get(&self, note_id: NoteId) -> Option<&OpenViewer> {
        self.open.get(&note_id)
    }

    /// Unmounts the reader for `note_id`. Dropping the viewer releases its
    /// screen-capture guard. Returns whether anything was closed.
    pub fn close(&mut self, note_id: NoteId) -> bool {
        let pending = match self.opening.remove(&note_id) {
            Some((_, unmount)) => {
                unmount.cancel();
                true
            }
            None => false,
        };
        let open = self.open.remove(&note_id).is_some();
        pending || open
    }
}

/// One registered open attempt. If it is dropped before being settled (the
/// request future was cancelled), its `opening` entry is removed.
pub struct OpenAttempt {
    app_state: Arc<AppState>,
    note_id: NoteId,
    ticket: u64,
    settled: bool,
}

impl OpenAttempt {
    pub async fn begin(app_state: Arc<AppState>, note_id: NoteId, unmount: CancellationToken) -> Self {
        let ticket = app_state.readers.lock().await.begin_open(note_id, unmount);
        Self {
            app_state,
            note_id,
            ticket,
            settled: false,
        }
    }

    /// Stores the viewer; see [`ReaderRegistry::finish_open`].
    pub async fn finish(mut self, viewer: OpenViewer) -> bool {
        let mut readers = self.app_state.readers.lock().await;
        self.settled = true;
        readers.finish_open(self.note_id, self.ticket, viewer)
    }

    pub async fn abandon(mut self) {
        let mut readers = self.app_state.readers.lock().await;
        self.settled = true;
        readers.abandon_open(self.note_id, self.ticket);
    }
}

impl Drop for OpenAttempt {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        debug!(note_id = %self.note_id, "Open request dropped; abandoning attempt.");
        if let Ok(mut readers) = self.app_state.readers.try_lock() {
            readers.abandon_open(self.note_id, self.ticket);
            return;
        }
        let (app_state, note_id, ticket) = (self.app_state.clone(), self.note_id, self.ticket);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    app_state.readers.lock().await.abandon_open(note_id, ticket);
                });
            }
            Err(_) => warn!(%note_id, "No runtime to abandon the open attempt on."),
        }
    }
}

//=========================================================================================
// Assembly
//=========================================================================================

/// Wires the gateways, their event pumps and the orchestrator around the
/// given adapters. Must be called inside a tokio runtime.
pub fn assemble(
    config: Arc<Config>,
    store: Arc<dyn AccessStateStore>,
    backend: Arc<dyn NoteBackend>,
    clock: Arc<dyn Clock>,
) -> Arc<AppState> {
    let shell = Arc::new(ShellBridge::new(SHELL_COMMAND_BUFFER));
    let screen_capture: Arc<dyn ScreenCapture> = Arc::new(ShellScreenCapture::new(shell.clone()));

    let rewarded_unit = ad_unit(&config.rewarded_ad_unit_id, &config.ad_keywords);
    let rewarded_ads = Arc::new(AdGateway::new(
        Arc::new(ShellAdSdk::new(AdUnitKind::Rewarded, rewarded_unit.clone(), shell.clone())),
        rewarded_unit,
    ));
    let interstitial_unit = ad_unit(&config.interstitial_ad_unit_id, &config.ad_keywords);
    let interstitial_ads = Arc::new(AdGateway::new(
        Arc::new(ShellAdSdk::new(AdUnitKind::Interstitial, interstitial_unit.clone(), shell.clone())),
        interstitial_unit,
    ));

    let (rewarded_events, rewarded_rx) = mpsc::channel(AD_EVENT_BUFFER);
    let (interstitial_events, interstitial_rx) = mpsc::channel(AD_EVENT_BUFFER);
    rewarded_ads.clone().spawn_event_pump(rewarded_rx);
    interstitial_ads.clone().spawn_event_pump(interstitial_rx);

    let orchestrator = Arc::new(
        AccessOrchestrator::new(store, clock, rewarded_ads.clone())
            .with_interstitials(interstitial_ads.clone()),
    );

    Arc::new(AppState {
        config,
        orchestrator,
        backend,
        screen_capture,
        shell,
        rewarded_ads,
        interstitial_ads,
        rewarded_events,
        interstitial_events,
        readers: Mutex::new(ReaderRegistry::default()),
    })
}

fn ad_unit(unit_id: &str, keywords: &[String]) -> AdUnitConfig {
    AdUnitConfig {
        unit_id: unit_id.to_string(),
        keywords: keywords.to_vec(),
    }
}
