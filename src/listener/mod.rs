//! Event Listeners
//!
//! A listener binds one callback to one event type inside one container, on
//! behalf of one script. The callback strategy decides what a listener can do
//! with the event: consumers and runnables only cause side effects, functions
//! can answer with an overridable/abortable return, dummies only make the
//! container report interest in the event type.

pub mod container;

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use uuid::Uuid;

use crate::error::BindError;
use crate::event::{EventPayload, EventReturn, EventType, ReturnType};

pub use container::{ListenerList, ListenerSnapshot, ListenerSource, ListenersContainer};

type ConsumerFn = Arc<dyn Fn(&dyn EventPayload) + Send + Sync>;
type FunctionFn = Arc<dyn Fn(&dyn EventPayload) -> Option<Box<dyn EventReturn>> + Send + Sync>;
type RunnableFn = Arc<dyn Fn() + Send + Sync>;

/// How a listener was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Consumer,
    Function,
    Runnable,
    Dummy,
    /// Bound from a declarative binding manifest, with an explicit priority
    Manifest,
}

/// Type-checked, type-erased listener body.
///
/// Building a callback validates the payload and return types against the
/// event type's descriptor, so a mismatch is caught at bind time.
#[derive(Clone)]
pub enum Callback {
    Consumer(ConsumerFn),
    Function(FunctionFn),
    Runnable(RunnableFn),
    Dummy,
}

impl Callback {
    pub fn consumer<E, F>(event_type: EventType, f: F) -> Result<Self, BindError>
    where
        E: EventPayload,
        F: Fn(&E) + Send + Sync + 'static,
    {
        check_payload::<E>(event_type)?;
        Ok(Callback::Consumer(Arc::new(move |event: &dyn EventPayload| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                f(event);
            }
        })))
    }

    pub fn function<E, R, F>(event_type: EventType, f: F) -> Result<Self, BindError>
    where
        E: EventPayload,
        R: ReturnType,
        F: Fn(&E) -> Option<R> + Send + Sync + 'static,
    {
        check_payload::<E>(event_type)?;
        if !event_type.accepts_return(R::KIND) {
            return Err(BindError::ReturnMismatch {
                event_type,
                found: R::KIND,
                accepted: event_type.return_kinds(),
            });
        }
        Ok(Callback::Function(Arc::new(move |event: &dyn EventPayload| {
            let event = event.as_any().downcast_ref::<E>()?;
            f(event).map(|r| Box::new(r) as Box<dyn EventReturn>)
        })))
    }

    pub fn runnable<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Callback::Runnable(Arc::new(f))
    }

    pub fn dummy() -> Self {
        Callback::Dummy
    }

    /// The listener kind this callback produces when bound directly
    pub fn kind(&self) -> ListenerKind {
        match self {
            Callback::Consumer(_) => ListenerKind::Consumer,
            Callback::Function(_) => ListenerKind::Function,
            Callback::Runnable(_) => ListenerKind::Runnable,
            Callback::Dummy => ListenerKind::Dummy,
        }
    }

    fn execute(&self, event: &dyn EventPayload) -> Option<Box<dyn EventReturn>> {
        match self {
            Callback::Consumer(f) => {
                f(event);
                None
            }
            Callback::Function(f) => f(event),
            Callback::Runnable(f) => {
                f();
                None
            }
            Callback::Dummy => None,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback::{:?}", self.kind())
    }
}

fn check_payload<E: EventPayload>(event_type: EventType) -> Result<(), BindError> {
    if TypeId::of::<E>() == event_type.payload_type() {
        Ok(())
    } else {
        Err(BindError::PayloadMismatch {
            event_type,
            expected: event_type.payload_name(),
            found: type_name::<E>(),
        })
    }
}

/// A registered callback
pub struct EventListener {
    id: Uuid,
    container: Weak<ListenersContainer>,
    event_type: EventType,
    /// Name of the script that created this listener
    owner: Arc<str>,
    kind: ListenerKind,
    priority: i32,
    callback: Callback,
    registered: AtomicBool,
}

impl EventListener {
    pub fn new(
        container: &Arc<ListenersContainer>,
        event_type: EventType,
        owner: Arc<str>,
        kind: ListenerKind,
        priority: i32,
        callback: Callback,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            container: Arc::downgrade(container),
            event_type,
            owner,
            kind,
            priority,
            callback,
            registered: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Container this listener was bound to, if it still exists
    pub fn container(&self) -> Option<Arc<ListenersContainer>> {
        self.container.upgrade()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn mark_registered(&self) {
        self.registered.store(true, Ordering::Release);
    }

    pub(crate) fn mark_unregistered(&self) {
        self.registered.store(false, Ordering::Release);
    }

    /// Run the callback. Panics propagate; the dispatcher isolates them.
    pub fn execute(&self, event: &dyn EventPayload) -> Option<Box<dyn EventReturn>> {
        self.callback.execute(event)
    }

    /// Remove this listener from its container. Safe to call any number of
    /// times; only the first call has an effect.
    pub fn unregister_me(&self) -> bool {
        if !self.registered.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.container.upgrade() {
            Some(container) => container.remove(self),
            // Owner is gone, and the list went with it
            None => true,
        }
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("event_type", &self.event_type)
            .field("owner", &self.owner)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("registered", &self.is_registered())
            .finish()
    }
}
