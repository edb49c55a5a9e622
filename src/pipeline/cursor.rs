//! Traversal state for one event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use super::{Context, Flow, Handler};
use crate::event::{Direction, Event};

/// Handler list snapshot shared by every traversal started from it.
pub type HandlerList = Arc<[Arc<dyn Handler>]>;

/// Walks a handler list in one direction, one handler per step.
///
/// Inbound traversal starts at index 0 and moves up; outbound traversal
/// starts at the last index and moves down.
pub struct Cursor {
    handlers: HandlerList,
    direction: Direction,
    step: usize,
}

impl Cursor {
    /// Position a cursor before the first handler for `direction`.
    pub fn new(handlers: HandlerList, direction: Direction) -> Self {
        Self {
            handlers,
            direction,
            step: 0,
        }
    }

    /// Index of the handler the next step will invoke.
    pub fn position(&self) -> Option<usize> {
        let len = self.handlers.len();
        if self.step >= len {
            return None;
        }
        Some(match self.direction {
            Direction::Inbound => self.step,
            Direction::Outbound => len - 1 - self.step,
        })
    }

    /// Whether every handler has been visited.
    pub fn is_finished(&self) -> bool {
        self.step >= self.handlers.len()
    }

    /// Invoke the next handler. Returns `false` once traversal is over,
    /// either because the list is exhausted or a handler stopped the event.
    ///
    /// A handler error or panic is logged and treated as [`Flow::Continue`].
    pub fn proceed(&mut self, ctx: &Context<'_>, event: &mut Event) -> bool {
        let Some(index) = self.position() else {
            return false;
        };
        self.step += 1;

        let handler = &self.handlers[index];
        match catch_unwind(AssertUnwindSafe(|| handler.handle(ctx, event))) {
            Ok(Ok(Flow::Continue)) => !self.is_finished(),
            Ok(Ok(Flow::Stop)) => {
                self.step = self.handlers.len();
                false
            }
            Ok(Err(e)) => {
                warn!(handler = handler.name(), error = %e, "handler failed, continuing");
                !self.is_finished()
            }
            Err(panic) => {
                warn!(
                    handler = handler.name(),
                    panic = panic_message(panic.as_ref()),
                    "handler panicked, continuing"
                );
                !self.is_finished()
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("direction", &self.direction)
            .field("step", &self.step)
            .field("len", &self.handlers.len())
            .finish()
    }
}
