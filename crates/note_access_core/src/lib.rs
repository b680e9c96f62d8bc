pub mod domain;
pub mod gateway;
pub mod orchestrator;
pub mod policy;
pub mod ports;
pub mod reader;
pub mod viewer;

pub use domain::{AccessState, DocumentType, Note, NoteAccessGrant, NoteId, ViewerSession};
pub use gateway::{AdGateway, AdPhase, AdUnitConfig, GatewayError, InterstitialSource, RewardSource};
pub use orchestrator::{AccessError, AccessOrchestrator};
pub use ports::{AccessStateStore, AdEvent, AdSdk, Clock, NoteBackend, PortError, PortResult, ScreenCapture};
pub use reader::{OpenViewer, ReaderError, ReaderSession};
pub use viewer::{NavigationPolicy, ScreenCaptureGuard, SurfaceSettings, ViewerTarget};
