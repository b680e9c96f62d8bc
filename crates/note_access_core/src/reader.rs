//! crates/note_access_core/src/reader.rs
//!
//! The reader session: what a note-reading screen does when it opens.
//! Gate access, fetch a fresh signed URL, and hand back everything the host
//! surface needs. A `CancellationToken` stands in for "the screen is still
//! mounted"; anything that resolves after cancellation is discarded.

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{Note, NoteId, ViewerSession};
use crate::orchestrator::{AccessError, AccessOrchestrator};
use crate::ports::{NoteBackend, PortError, ScreenCapture};
use crate::viewer::{NavigationPolicy, ScreenCaptureGuard, SurfaceSettings, ViewerTarget};

pub const AD_NOT_COMPLETED_MESSAGE: &str = "Please complete the ad to open this note.";
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load note.";

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("{}", AD_NOT_COMPLETED_MESSAGE)]
    AdNotCompleted,
    #[error("{}", LOAD_FAILED_MESSAGE)]
    Backend(#[source] PortError),
    #[error(transparent)]
    Access(#[from] AccessError),
    /// The screen went away while a step was still pending.
    #[error("reader closed before the note finished loading")]
    Unmounted,
}

/// Everything the host needs to show one note.
pub struct OpenViewer {
    pub note: Note,
    pub session: ViewerSession,
    pub target: ViewerTarget,
    pub navigation: NavigationPolicy,
    pub surface: SurfaceSettings,
    _capture: ScreenCaptureGuard,
}

pub struct ReaderSession {
    orchestrator: Arc<AccessOrchestrator>,
    backend: Arc<dyn NoteBackend>,
    screen_capture: Arc<dyn ScreenCapture>,
    mounted: CancellationToken,
}

impl ReaderSession {
    pub fn new(
        orchestrator: Arc<AccessOrchestrator>,
        backend: Arc<dyn NoteBackend>,
        screen_capture: Arc<dyn ScreenCapture>,
    ) -> Self {
        Self {
            orchestrator,
            backend,
            screen_capture,
            mounted: CancellationToken::new(),
        }
    }

    /// A handle that unmounts this session when cancelled.
    pub fn unmount_handle(&self) -> CancellationToken {
        self.mounted.clone()
    }

    pub fn unmount(&self) {
        self.mounted.cancel();
    }

    pub async fn open(&self, note_id: NoteId) -> Result<OpenViewer, ReaderError> {
        let granted = self.while_mounted(self.orchestrator.ensure_view_access(note_id)).await??;
        if !granted {
            info!(%note_id, "Reader blocked: ad not completed.");
            return Err(ReaderError::AdNotCompleted);
        }

        let note = self
            .while_mounted(self.backend.get_note(note_id))
            .await?
            .map_err(|e| {
                error!(%note_id, "Failed to load note metadata: {:?}", e);
                ReaderError::Backend(e)
            })?;
        let grant = self
            .while_mounted(self.backend.request_access(note_id))
            .await?
            .map_err(|e| {
                error!(%note_id, "Access request failed: {:?}", e);
                ReaderError::Backend(e)
            })?;

        // Last check before anything outlives this call.
        if self.mounted.is_cancelled() {
            return Err(ReaderError::Unmounted);
        }

        let session = ViewerSession::new(grant, note.document_type, self.orchestrator.clock().now());
        let signed_url = session.grant.viewer_url.clone();
        info!(
            %note_id,
            document_type = ?note.document_type,
            expires_in = session.grant.expires_in_seconds,
            "Opening note viewer."
        );

        Ok(OpenViewer {
            target: ViewerTarget::for_document(note.document_type, &signed_url),
            navigation: NavigationPolicy::new(signed_url, note.document_type),
            surface: SurfaceSettings::locked_down(),
            _capture: ScreenCaptureGuard::acquire(self.screen_capture.clone()),
            note,
            session,
        })
    }

    /// Runs `step` unless the session is unmounted first.
    async fn while_mounted<T>(&self, step: impl Future<Output = T>) -> Result<T, ReaderError> {
        tokio::select! {
            biased;
            _ = self.mounted.cancelled() => {
                warn!("Reader unmounted; discarding pending step.");
                Err(ReaderError::Unmounted)
            }
            value = step => {
                if self.mounted.is_cancelled() {
                    Err(ReaderError::Unmounted)
                } else {
                    Ok(value)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccessState, DocumentType, NoteAccessGrant};
    use crate::gateway::{GatewayError, RewardSource};
    use crate::orchestrator::tests::{today, FixedClock, MemoryStore, ScriptedRewards};
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI32, Ordering};
    use tokio::sync::Notify;

    struct StaticBackend {
        document_type: DocumentType,
        fail_access: bool,
    }

    #[async_trait]
    impl NoteBackend for StaticBackend {
        async fn get_note(&self, note_id: NoteId) -> PortResult<Note> {
            Ok(Note {
                id: note_id,
                title_en: "Constitution of Nepal".to_string(),
                title_np: String::new(),
                document_type: self.document_type,
                file_name: "constitution.pdf".to_string(),
            })
        }

        async fn request_access(&self, note_id: NoteId) -> PortResult<NoteAccessGrant> {
            if self.fail_access {
                return Err(PortError::Unexpected("HTTP 500".to_string()));
            }
            Ok(NoteAccessGrant {
                note_id,
                viewer_url: format!("https://files.example.com/{}?sig=s", note_id),
                expires_in_seconds: 300,
            })
        }
    }

    #[derive(Default)]
    struct CountingCapture(AtomicI32);

    impl ScreenCapture for CountingCapture {
        fn prevent(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn allow(&self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Holds the ad on screen until released.
    struct HeldRewards {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RewardSource for HeldRewards {
        async fn show_for_reward(&self) -> Result<bool, GatewayError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(true)
        }
    }

    fn session(
        rewards: Arc<dyn RewardSource>,
        backend: StaticBackend,
    ) -> (Arc<MemoryStore>, Arc<CountingCapture>, ReaderSession) {
        let store = Arc::new(MemoryStore::default());
        let capture = Arc::new(CountingCapture::default());
        let orchestrator = Arc::new(AccessOrchestrator::new(
            store.clone(),
            Arc::new(FixedClock(today())),
            rewards,
        ));
        let reader = ReaderSession::new(orchestrator, Arc::new(backend), capture.clone());
        (store, capture, reader)
    }

    #[tokio::test]
    async fn opens_pdf_inline_and_blocks_capture_while_open() {
        let backend = StaticBackend {
            document_type: DocumentType::Pdf,
            fail_access: false,
        };
        let (_store, capture, reader) = session(Arc::new(ScriptedRewards::answering(true)), backend);

        let viewer = reader.open(NoteId(42)).await.unwrap();
        assert!(matches!(viewer.target, ViewerTarget::InlineHtml { .. }));
        assert!(!viewer.navigation.allows("https://evil.example/x"));
        assert!(!viewer.surface.cache_enabled);
        assert_eq!(capture.0.load(Ordering::SeqCst), 1);

        drop(viewer);
        assert_eq!(capture.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn declined_ad_reports_a_user_message() {
        let backend = StaticBackend {
            document_type: DocumentType::Docx,
            fail_access: false,
        };
        let (_store, capture, reader) = session(Arc::new(ScriptedRewards::answering(false)), backend);

        let err = reader.open(NoteId(1)).await.err().unwrap();
        assert!(matches!(err, ReaderError::AdNotCompleted));
        assert_eq!(err.to_string(), AD_NOT_COMPLETED_MESSAGE);
        assert_eq!(capture.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_failure_is_surfaced_without_retry() {
        let backend = StaticBackend {
            document_type: DocumentType::Pdf,
            fail_access: true,
        };
        let (_store, _capture, reader) = session(Arc::new(ScriptedRewards::answering(true)), backend);

        let err = reader.open(NoteId(1)).await.err().unwrap();
        assert!(matches!(err, ReaderError::Backend(_)));
        assert_eq!(err.to_string(), LOAD_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn unmount_during_the_ad_persists_nothing() {
        let rewards = Arc::new(HeldRewards {
            started: Notify::new(),
            release: Notify::new(),
        });
        let backend = StaticBackend {
            document_type: DocumentType::Pdf,
            fail_access: false,
        };
        let (store, capture, reader) = session(rewards.clone(), backend);

        let unmount = reader.unmount_handle();
        let opening = reader.open(NoteId(9));
        tokio::pin!(opening);

        tokio::select! {
            _ = &mut opening => panic!("open finished while the ad was held"),
            _ = rewards.started.notified() => {}
        }
        unmount.cancel();
        rewards.release.notify_one();

        assert!(matches!(opening.await, Err(ReaderError::Unmounted)));
        assert_eq!(store.snapshot(), AccessState::default());
        assert_eq!(capture.0.load(Ordering::SeqCst), 0);
    }
}
