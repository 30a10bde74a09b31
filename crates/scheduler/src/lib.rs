//! Review Annotator Scheduler Library
//!
//! Cooperative scheduling primitives for the single-threaded viewer:
//! next-frame coalescing, trailing-timer debouncing and cancellation of
//! in-flight requests.
//!
//! # Example
//!
//! ```
//! use annotator_scheduler::{FrameScheduler, RequestKind, RequestRegistry};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Task { SyncLayout }
//!
//! let mut frames = FrameScheduler::new();
//! let mut requests = RequestRegistry::new();
//!
//! frames.request_frame(Task::SyncLayout);
//! let (_, token) = requests.register(RequestKind::DocumentLoad);
//!
//! // Teardown: nothing may fire afterwards.
//! frames.close();
//! requests.cancel_all();
//! assert!(frames.take_frame().is_empty());
//! assert!(token.is_cancelled());
//! ```

mod cancel;
pub mod frame;

pub use cancel::{CancellationToken, RequestId, RequestKind, RequestRegistry};
pub use frame::{FrameScheduler, LAYOUT_DEBOUNCE};
