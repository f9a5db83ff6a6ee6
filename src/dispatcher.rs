//! Event Dispatcher
//!
//! Notifies a local container's listeners, then the global container's, folding
//! listener returns into one result:
//!
//! - a return replaces the running result if there is none yet or if it
//!   overrides
//! - otherwise, an aborting return stops the walk, local and global alike
//!
//! The synchronous path runs inline on the caller's thread and never awaits.
//! When no container has a listener for the event type the dispatch returns
//! before touching any listener list.

use std::ops::ControlFlow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::event::{EventPayload, EventReturn, EventType, ReturnType};
use crate::listener::{EventListener, ListenerSource, ListenersContainer};
use crate::worker::{ScheduledTask, WorkerPool, panic_message};

pub struct EventDispatcher {
    global: Arc<dyn ListenerSource>,
    pool: Arc<dyn WorkerPool>,
}

impl EventDispatcher {
    pub fn new(global: Arc<dyn ListenerSource>, pool: Arc<dyn WorkerPool>) -> Self {
        Self { global, pool }
    }

    pub fn pool(&self) -> &Arc<dyn WorkerPool> {
        &self.pool
    }

    /// Whether dispatching `event_type` with `local` would reach any listener
    pub fn has_listener(&self, event_type: EventType, local: Option<&ListenersContainer>) -> bool {
        local.is_some_and(|c| c.has_listener(event_type)) || self.global.has_listener(event_type)
    }

    /// Side-effect dispatch; any return is discarded
    pub fn notify(&self, event: &dyn EventPayload, local: Option<&ListenersContainer>) {
        self.notify_from(event, local.map(|c| c as &dyn ListenerSource));
    }

    pub fn notify_from(&self, event: &dyn EventPayload, local: Option<&dyn ListenerSource>) {
        let _ = self.dispatch_from::<Discard>(event, local);
    }

    /// Dispatch and combine listener returns of type `R`
    pub fn notify_event<R: ReturnType>(
        &self,
        event: &dyn EventPayload,
        local: Option<&ListenersContainer>,
    ) -> Option<R> {
        self.notify_event_from(event, local.map(|c| c as &dyn ListenerSource))
    }

    /// [`notify_event`](Self::notify_event) over any listener source
    pub fn notify_event_from<R: ReturnType>(
        &self,
        event: &dyn EventPayload,
        local: Option<&dyn ListenerSource>,
    ) -> Option<R> {
        self.dispatch_from::<Typed<R>>(event, local)
    }

    fn dispatch_from<C: Combine>(
        &self,
        event: &dyn EventPayload,
        local: Option<&dyn ListenerSource>,
    ) -> Option<C::Output> {
        let event_type = checked_type(event);

        let local = local.filter(|c| c.has_listener(event_type));
        if local.is_none() && !self.global.has_listener(event_type) {
            return None;
        }

        let mut combiner = C::default();
        if let Some(local) = local {
            if notify_source(local, event, &mut combiner).is_break() {
                return combiner.finish();
            }
        }
        let _ = notify_source(self.global.as_ref(), event, &mut combiner);
        combiner.finish()
    }

    /// Walk `containers` then global on the worker pool. Fire-and-forget.
    pub fn notify_event_async<E: EventPayload>(&self, event: E, containers: &[Arc<ListenersContainer>]) {
        let event_type = checked_type(&event);
        if !self.any_listener(event_type, containers) {
            return;
        }

        let containers = containers.to_vec();
        let global = self.global.clone();
        self.pool.submit(Box::new(move || {
            walk_all(&event, &containers, global.as_ref());
        }));
    }

    /// Walk `container` then global after `delay`. Returns `None` if nothing
    /// listens, otherwise a handle that cancels the pending dispatch.
    pub fn notify_event_async_delayed<E: EventPayload>(
        &self,
        event: E,
        container: &Arc<ListenersContainer>,
        delay: Duration,
    ) -> Option<ScheduledTask> {
        let event_type = checked_type(&event);
        if !self.any_listener(event_type, std::slice::from_ref(container)) {
            return None;
        }

        let container = container.clone();
        let global = self.global.clone();
        Some(self.pool.schedule(
            Box::new(move || {
                walk_all(&event, std::slice::from_ref(&container), global.as_ref());
            }),
            delay,
        ))
    }

    fn any_listener(&self, event_type: EventType, containers: &[Arc<ListenersContainer>]) -> bool {
        containers.iter().any(|c| c.has_listener(event_type)) || self.global.has_listener(event_type)
    }
}

fn checked_type(event: &dyn EventPayload) -> EventType {
    let event_type = event.event_type();
    debug_assert_eq!(
        event.as_any().type_id(),
        event_type.payload_type(),
        "payload is not tagged with its own event type"
    );
    event_type
}

fn walk_all(event: &dyn EventPayload, containers: &[Arc<ListenersContainer>], global: &dyn ListenerSource) {
    let mut combiner = Discard::default();
    for container in containers {
        if container.has_listener(event.event_type())
            && notify_source(container.as_ref(), event, &mut combiner).is_break()
        {
            return;
        }
    }
    let _ = notify_source(global, event, &mut combiner);
}

fn notify_source<C: Combine>(
    source: &dyn ListenerSource,
    event: &dyn EventPayload,
    combiner: &mut C,
) -> ControlFlow<()> {
    for listener in source.listeners(event.event_type()).iter() {
        if !listener.is_registered() {
            trace!(owner = %listener.owner(), "Skipping listener unregistered mid-dispatch");
            continue;
        }
        if let Some(ret) = execute_isolated(source, listener, event) {
            if combiner.accept(ret).is_break() {
                return ControlFlow::Break(());
            }
        }
    }
    ControlFlow::Continue(())
}

fn execute_isolated(
    source: &dyn ListenerSource,
    listener: &EventListener,
    event: &dyn EventPayload,
) -> Option<Box<dyn EventReturn>> {
    match catch_unwind(AssertUnwindSafe(|| listener.execute(event))) {
        Ok(ret) => ret,
        Err(panic) => {
            warn!(
                container = %source.name(),
                event_type = %listener.event_type(),
                owner = %listener.owner(),
                "Listener panicked: {}",
                panic_message(panic.as_ref())
            );
            None
        }
    }
}

// ===== Combine rules =====

trait Combine: Default {
    type Output;

    fn accept(&mut self, ret: Box<dyn EventReturn>) -> ControlFlow<()>;

    fn finish(self) -> Option<Self::Output>;
}

/// A return is taken when nothing was taken yet or when it overrides. Only
/// a return that is not taken may abort the walk.
fn fold(taken: bool, ret: &dyn EventReturn) -> (bool, ControlFlow<()>) {
    if !taken || ret.is_override() {
        (true, ControlFlow::Continue(()))
    } else if ret.is_abort() {
        (false, ControlFlow::Break(()))
    } else {
        (false, ControlFlow::Continue(()))
    }
}

#[derive(Default)]
struct Discard {
    taken: bool,
}

impl Combine for Discard {
    type Output = ();

    fn accept(&mut self, ret: Box<dyn EventReturn>) -> ControlFlow<()> {
        let (take, next) = fold(self.taken, ret.as_ref());
        self.taken |= take;
        next
    }

    fn finish(self) -> Option<()> {
        None
    }
}

struct Typed<R> {
    acc: Option<R>,
}

impl<R> Default for Typed<R> {
    fn default() -> Self {
        Self { acc: None }
    }
}

impl<R: ReturnType> Combine for Typed<R> {
    type Output = R;

    fn accept(&mut self, ret: Box<dyn EventReturn>) -> ControlFlow<()> {
        let kind = ret.kind();
        if kind != R::KIND {
            debug!("Ignoring {:?} return, caller expects {:?}", kind, R::KIND);
            return ControlFlow::Continue(());
        }

        let (take, next) = fold(self.acc.is_some(), ret.as_ref());
        if take {
            if let Ok(r) = ret.into_any().downcast::<R>() {
                self.acc = Some(*r);
            }
        }
        next
    }

    fn finish(self) -> Option<R> {
        self.acc
    }
}
