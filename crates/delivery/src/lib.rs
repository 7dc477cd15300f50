pub mod error;
pub mod loader;
pub mod pipeline;
pub mod policy;
pub mod scheduler;
pub mod state;
pub mod visibility;

/// Re-export common types for easier usage
pub use error::LoadError;
pub use loader::{Fidelity, ImageLoader, LoadEvent, LoadOutcome, LoadedImage, LoaderConfig};
pub use pipeline::MediaPipeline;
pub use policy::{
    ConnectionClass, ConnectionSignal, LinkClass, NetworkConditionMonitor, QualityPolicy,
};
pub use scheduler::{LoadExecutor, LoadHandle, LoadState, Priority, RequestScheduler, SchedulerStats};
pub use state::LoadPhase;
pub use visibility::{MediaSlot, Relevance, SlotId, SlotMark, Viewport, VisibilityTracker};
