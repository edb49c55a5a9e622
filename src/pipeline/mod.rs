//! Direction-aware handler pipeline.
//!
//! One ordered list of handlers serves both directions. Inbound events visit
//! handlers front to back, outbound events back to front, so wire-adjacent
//! handlers sit at the front of the list and application handlers at the
//! back.
//!
//! Dispatch is re-entrant without recursion: while a traversal is running on
//! a pipeline, further [`Pipeline::dispatch`] calls (from handlers, or from
//! other threads) only queue their event. The outermost call drains the queue
//! once its own traversal completes.

mod cursor;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::{EngineError, Result};
use crate::event::{Event, Inbound, Outbound, Priority};

pub use self::cursor::{Cursor, HandlerList};

/// What a handler wants done with the event after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Pass the event to the next handler.
    Continue,
    /// Consume the event.
    Stop,
}

/// A pipeline stage.
pub trait Handler: Send + Sync {
    /// Name used in logs and by [`Position::Before`]/[`Position::After`].
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handle one event. Returning an error logs it and continues.
    fn handle(&self, ctx: &Context<'_>, event: &mut Event) -> Result<Flow>;
}

/// Where to insert a handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Position {
    /// Closest to the wire.
    First,
    /// Closest to the application.
    Last,
    /// At an index, clamped to the list length.
    At(usize),
    /// Immediately before the named handler.
    Before(String),
    /// Immediately after the named handler.
    After(String),
}

/// What a handler sees besides the event.
pub struct Context<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> Context<'a> {
    /// The connection this pipeline serves.
    pub fn connection(&self) -> &'a Arc<Connection> {
        &self.pipeline.connection
    }

    /// The pipeline itself.
    pub fn pipeline(&self) -> &'a Pipeline {
        self.pipeline
    }

    /// Queue another event. It runs after the current traversal.
    pub fn dispatch(&self, event: impl Into<Event>) {
        self.pipeline.dispatch(event);
    }

    /// Queue an outbound command at its default priority.
    pub fn send(&self, message: Outbound) {
        self.pipeline.dispatch(Event::transmit(message));
    }

    /// Queue an outbound command at `priority`.
    pub fn send_with_priority(&self, message: Outbound, priority: Priority) {
        self.pipeline.dispatch(Event::Transmit { message, priority });
    }
}

#[derive(Default)]
struct DispatchState {
    active: bool,
    pending: VecDeque<Event>,
}

/// Resets the active marker if a handler panics mid-traversal.
struct ActiveGuard<'a> {
    state: &'a Mutex<DispatchState>,
    armed: bool,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().active = false;
        }
    }
}

/// An ordered, shared handler list plus its dispatch queue.
pub struct Pipeline {
    connection: Arc<Connection>,
    handlers: RwLock<HandlerList>,
    state: Mutex<DispatchState>,
}

impl Pipeline {
    /// Create an empty pipeline for `connection`.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            handlers: RwLock::new(Arc::from(Vec::new())),
            state: Mutex::new(DispatchState::default()),
        }
    }

    /// The connection this pipeline serves.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Insert a handler. Traversals already running keep their snapshot.
    pub fn register(&self, handler: Arc<dyn Handler>, position: Position) -> Result<()> {
        let mut handlers = self.handlers.write();
        let mut list: Vec<Arc<dyn Handler>> = handlers.iter().cloned().collect();

        let index = match &position {
            Position::First => 0,
            Position::Last => list.len(),
            Position::At(i) => (*i).min(list.len()),
            Position::Before(name) | Position::After(name) => {
                let found = list
                    .iter()
                    .position(|h| h.name() == name)
                    .ok_or_else(|| EngineError::UnknownHandler(name.clone()))?;
                if matches!(position, Position::After(_)) {
                    found + 1
                } else {
                    found
                }
            }
        };

        debug!(handler = handler.name(), index, "registering handler");
        list.insert(index, handler);
        *handlers = Arc::from(list);
        Ok(())
    }

    /// Remove the first handler with `name`. Returns whether one was removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut handlers = self.handlers.write();
        let mut list: Vec<Arc<dyn Handler>> = handlers.iter().cloned().collect();
        match list.iter().position(|h| h.name() == name) {
            Some(index) => {
                list.remove(index);
                *handlers = Arc::from(list);
                true
            }
            None => false,
        }
    }

    /// Handler names in list order.
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers
            .read()
            .iter()
            .map(|h| h.name().to_owned())
            .collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Route an event through the handlers.
    ///
    /// If a dispatch is already running on this pipeline the event is queued
    /// and this returns immediately.
    pub fn dispatch(&self, event: impl Into<Event>) {
        let event = event.into();
        {
            let mut state = self.state.lock();
            if state.active {
                trace!("dispatch active, queueing event");
                state.pending.push_back(event);
                return;
            }
            state.active = true;
        }

        let mut guard = ActiveGuard {
            state: &self.state,
            armed: true,
        };
        let mut next = Some(event);
        while let Some(mut event) = next.take() {
            self.traverse(&mut event);

            let mut state = self.state.lock();
            next = state.pending.pop_front();
            if next.is_none() {
                state.active = false;
                guard.armed = false;
            }
        }
    }

    /// Dispatch an inbound event.
    pub fn dispatch_inbound(&self, event: Inbound) {
        self.dispatch(Event::Received(event));
    }

    /// Dispatch an outbound command at `priority`.
    pub fn dispatch_outbound(&self, message: Outbound, priority: Priority) {
        self.dispatch(Event::Transmit { message, priority });
    }

    fn traverse(&self, event: &mut Event) {
        let snapshot = self.handlers.read().clone();
        let ctx = Context { pipeline: self };
        let mut cursor = Cursor::new(snapshot, event.direction());
        while cursor.proceed(&ctx, event) {}
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.handler_names())
            .field("connection", &self.connection)
            .finish()
    }
}

/// A handler built from a closure.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Context<'_>, &mut Event) -> Result<Flow> + Send + Sync,
{
    /// Wrap `f` under `name`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Context<'_>, &mut Event) -> Result<Flow> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, ctx: &Context<'_>, event: &mut Event) -> Result<Flow> {
        (self.f)(ctx, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Direction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pipeline() -> Pipeline {
        Pipeline::new(Arc::new(Connection::new(None, encoding::UTF_8, "me")))
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(name: &str, log: &Log, flow: Flow) -> Arc<dyn Handler> {
        let log = log.clone();
        let tag = name.to_owned();
        Arc::new(FnHandler::new(name, move |_ctx: &Context<'_>, event: &mut Event| {
            let dir = match event.direction() {
                Direction::Inbound => "in",
                Direction::Outbound => "out",
            };
            log.lock().push(format!("{tag}:{dir}"));
            Ok(flow)
        }))
    }

    #[test]
    fn test_inbound_forward_outbound_reverse() {
        let p = pipeline();
        let log = Log::default();
        for name in ["a", "b", "c"] {
            p.register(recorder(name, &log, Flow::Continue), Position::Last)
                .unwrap();
        }

        p.dispatch(Inbound::Connected);
        p.dispatch(Outbound::CapEnd);
        assert_eq!(
            *log.lock(),
            vec!["a:in", "b:in", "c:in", "c:out", "b:out", "a:out"]
        );
    }

    #[test]
    fn test_stop_halts_propagation() {
        let p = pipeline();
        let log = Log::default();
        p.register(recorder("a", &log, Flow::Continue), Position::Last)
            .unwrap();
        p.register(recorder("b", &log, Flow::Stop), Position::Last)
            .unwrap();
        p.register(recorder("c", &log, Flow::Continue), Position::Last)
            .unwrap();

        p.dispatch(Inbound::Connected);
        assert_eq!(*log.lock(), vec!["a:in", "b:in"]);
    }

    #[test]
    fn test_error_does_not_halt_propagation() {
        let p = pipeline();
        let log = Log::default();
        p.register(
            Arc::new(FnHandler::new("broken", |_: &Context<'_>, _: &mut Event| {
                Err(EngineError::Handler("boom".into()))
            })),
            Position::Last,
        )
        .unwrap();
        p.register(recorder("after", &log, Flow::Continue), Position::Last)
            .unwrap();

        p.dispatch(Inbound::Connected);
        assert_eq!(*log.lock(), vec!["after:in"]);
    }

    #[test]
    fn test_positions() {
        let p = pipeline();
        let log = Log::default();
        p.register(recorder("b", &log, Flow::Continue), Position::Last)
            .unwrap();
        p.register(recorder("a", &log, Flow::Continue), Position::First)
            .unwrap();
        p.register(recorder("d", &log, Flow::Continue), Position::At(99))
            .unwrap();
        p.register(recorder("c", &log, Flow::Continue), Position::Before("d".into()))
            .unwrap();
        p.register(recorder("e", &log, Flow::Continue), Position::After("d".into()))
            .unwrap();
        assert_eq!(p.handler_names(), vec!["a", "b", "c", "d", "e"]);

        let err = p
            .register(recorder("x", &log, Flow::Continue), Position::After("nope".into()))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownHandler(_)));

        assert!(p.remove("c"));
        assert!(!p.remove("c"));
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn test_reentrant_event_runs_after_current() {
        let p = pipeline();
        let log = Log::default();
        let inner = log.clone();
        p.register(
            Arc::new(FnHandler::new("trigger", move |ctx: &Context<'_>, event: &mut Event| {
                if let Event::Received(Inbound::Connected) = event {
                    inner.lock().push("trigger:E".to_owned());
                    ctx.dispatch(Inbound::MotdEnd);
                } else {
                    inner.lock().push("trigger:F".to_owned());
                }
                Ok(Flow::Continue)
            })),
            Position::Last,
        )
        .unwrap();
        p.register(recorder("tail", &log, Flow::Continue), Position::Last)
            .unwrap();

        p.dispatch(Inbound::Connected);
        assert_eq!(
            *log.lock(),
            vec!["trigger:E", "tail:in", "trigger:F", "tail:in"]
        );
    }

    #[test]
    fn test_deep_reentrancy_does_not_grow_stack() {
        let p = pipeline();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        p.register(
            Arc::new(FnHandler::new("chain", move |ctx: &Context<'_>, _: &mut Event| {
                if seen.fetch_add(1, Ordering::SeqCst) + 1 < 10_000 {
                    ctx.dispatch(Inbound::MotdEnd);
                }
                Ok(Flow::Continue)
            })),
            Position::Last,
        )
        .unwrap();

        p.dispatch(Inbound::MotdEnd);
        assert_eq!(count.load(Ordering::SeqCst), 10_000);
    }

    #[test]
    fn test_panicking_handler_does_not_wedge_pipeline() {
        let p = Arc::new(pipeline());
        let calls = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let reached = after.clone();
        p.register(
            Arc::new(FnHandler::new("flaky", move |_: &Context<'_>, _: &mut Event| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first call panics");
                }
                Ok(Flow::Continue)
            })),
            Position::Last,
        )
        .unwrap();
        p.register(
            Arc::new(FnHandler::new("after", move |_: &Context<'_>, _: &mut Event| {
                reached.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Continue)
            })),
            Position::Last,
        )
        .unwrap();

        p.dispatch(Inbound::MotdEnd);
        p.dispatch(Inbound::MotdEnd);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(after.load(Ordering::SeqCst), 2);
    }
}
