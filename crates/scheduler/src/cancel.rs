//! Cancellation tokens for in-flight requests
//!
//! Document loads, annotation loads and saves are registered here so that a
//! newer request of the same kind, or teardown of the whole viewer, can cancel
//! them. Completion handlers check their token before touching any state.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token shared between the issuer and the completion handler
///
/// Clones observe the same state. A network call may hold a clone on another
/// thread, so the flag is atomic even though the viewer itself is
/// single-threaded.
///
/// # Example
///
/// ```
/// use annotator_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let in_flight = token.clone();
///
/// token.cancel();
/// assert!(in_flight.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token and every clone of it
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether `cancel()` was called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// What an in-flight request is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Downloading and opening the document itself
    DocumentLoad,
    /// Fetching the annotation set
    AnnotationLoad,
    /// Bulk upsert of the annotation set
    AnnotationSave,
    /// Flatten-and-upload export
    Export,
}

/// Identifier handed out by [`RequestRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Registry of in-flight requests owned by one viewer instance
///
/// # Example
///
/// ```
/// use annotator_scheduler::{RequestKind, RequestRegistry};
///
/// let mut registry = RequestRegistry::new();
/// let (_, first) = registry.register(RequestKind::DocumentLoad);
///
/// // A newer document load supersedes the first one.
/// registry.cancel_kind(RequestKind::DocumentLoad);
/// let (_, second) = registry.register(RequestKind::DocumentLoad);
///
/// assert!(first.is_cancelled());
/// assert!(!second.is_cancelled());
/// ```
#[derive(Debug, Default)]
pub struct RequestRegistry {
    next_id: u64,
    requests: HashMap<RequestId, (RequestKind, CancellationToken)>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and return its id and token
    pub fn register(&mut self, kind: RequestKind) -> (RequestId, CancellationToken) {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        let token = CancellationToken::new();
        self.requests.insert(id, (kind, token.clone()));
        (id, token)
    }

    /// Cancel one request
    ///
    /// Returns `true` if the request was registered.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        match self.requests.remove(&id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every request of the given kind
    ///
    /// Returns the number of requests cancelled.
    pub fn cancel_kind(&mut self, kind: RequestKind) -> usize {
        let ids: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(_, (k, _))| *k == kind)
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            self.cancel(*id);
        }
        ids.len()
    }

    /// Cancel everything (teardown)
    pub fn cancel_all(&mut self) -> usize {
        let count = self.requests.len();
        for (_, (_, token)) in self.requests.drain() {
            token.cancel();
        }
        count
    }

    /// Drop a finished request without cancelling it
    pub fn complete(&mut self, id: RequestId) -> bool {
        self.requests.remove(&id).is_some()
    }

    /// Whether the request is still registered and not cancelled
    pub fn is_live(&self, id: RequestId) -> bool {
        self.requests
            .get(&id)
            .is_some_and(|(_, token)| !token.is_cancelled())
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
