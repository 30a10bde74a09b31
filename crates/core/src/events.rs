//! Typed engine events and subscriptions

use crate::annotation::{Annotation, AnnotationId, PageRect};
use crate::mode::Mode;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Everything the engine reports to its host
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    ModeChanged { from: Mode, to: Mode },

    /// First layout pass completed; the engine accepts input
    Ready,

    AnnotationAdded(Annotation),
    AnnotationRemoved { id: AnnotationId, page: u32 },
    AnnotationModified(Annotation),
    SelectionChanged(Option<AnnotationId>),
    HistoryChanged { can_undo: bool, can_redo: bool },

    /// Host should show a text editor; `editing` is set when re-editing
    TextEditRequested {
        page: u32,
        rect: PageRect,
        initial: String,
        editing: Option<AnnotationId>,
    },

    /// The whole set was swapped (document reload)
    AnnotationsReplaced { count: usize },
}

/// Discriminant used to subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ModeChanged,
    Ready,
    AnnotationAdded,
    AnnotationRemoved,
    AnnotationModified,
    SelectionChanged,
    HistoryChanged,
    TextEditRequested,
    AnnotationsReplaced,
}

impl OverlayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            OverlayEvent::ModeChanged { .. } => EventKind::ModeChanged,
            OverlayEvent::Ready => EventKind::Ready,
            OverlayEvent::AnnotationAdded(_) => EventKind::AnnotationAdded,
            OverlayEvent::AnnotationRemoved { .. } => EventKind::AnnotationRemoved,
            OverlayEvent::AnnotationModified(_) => EventKind::AnnotationModified,
            OverlayEvent::SelectionChanged(_) => EventKind::SelectionChanged,
            OverlayEvent::HistoryChanged { .. } => EventKind::HistoryChanged,
            OverlayEvent::TextEditRequested { .. } => EventKind::TextEditRequested,
            OverlayEvent::AnnotationsReplaced { .. } => EventKind::AnnotationsReplaced,
        }
    }
}

type Handler = Rc<RefCell<dyn FnMut(&OverlayEvent)>>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, EventKind, Handler)>,
}

/// Single-threaded event dispatcher
///
/// Handlers may subscribe or unsubscribe while an event is being delivered;
/// changes take effect from the next emit.
#[derive(Default, Clone)]
pub struct EventBus {
    listeners: Rc<RefCell<Listeners>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn on(&self, kind: EventKind, handler: impl FnMut(&OverlayEvent) + 'static) -> Subscription {
        let mut listeners = self.listeners.borrow_mut();
        listeners.next_id += 1;
        let id = listeners.next_id;
        let handler: Handler = Rc::new(RefCell::new(handler));
        listeners.entries.push((id, kind, handler));
        Subscription {
            id,
            listeners: Rc::downgrade(&self.listeners),
        }
    }

    /// Deliver an event to every handler of its kind, in subscription order
    pub fn emit(&self, event: &OverlayEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| Rc::clone(h))
            .collect();

        for handler in handlers {
            // A handler that re-emits its own kind is not re-entered.
            match handler.try_borrow_mut() {
                Ok(mut handler) => (*handler)(event),
                Err(_) => tracing::debug!(?kind, "skipping re-entrant handler"),
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }

    /// Detach every handler
    pub fn clear(&self) {
        self.listeners.borrow_mut().entries.clear();
    }
}

/// Handle returned by [`EventBus::on`]
///
/// Dropping it keeps the handler attached; call [`Subscription::unsubscribe`]
/// to detach.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<RefCell<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.borrow_mut().entries.retain(|(id, _, _)| *id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.listeners
            .upgrade()
            .is_some_and(|l| l.borrow().entries.iter().any(|(id, _, _)| *id == self.id))
    }
}
