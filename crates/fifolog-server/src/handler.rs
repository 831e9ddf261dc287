use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::info;

use crate::error::DispatchError;

/// Error type line handlers return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Produces the per-process context handed to every dispatch.
///
/// Runs once in the supervising process (result discarded) and once inside
/// the reader process.
pub trait Initializer<C> {
    fn initialize(&mut self) -> C;
}

impl<C, F> Initializer<C> for F
where
    F: FnMut() -> C,
{
    fn initialize(&mut self) -> C {
        self()
    }
}

/// Consumes one complete line inside the reader process.
pub trait LineHandler<C> {
    fn handle(&mut self, line: &str, ctx: &mut C) -> Result<(), HandlerError>;
}

impl<C, F> LineHandler<C> for F
where
    F: FnMut(&str, &mut C) -> Result<(), HandlerError>,
{
    fn handle(&mut self, line: &str, ctx: &mut C) -> Result<(), HandlerError> {
        self(line, ctx)
    }
}

/// Runs once when the reader loop ends.
pub trait Finalizer {
    fn finalize(&mut self);
}

impl<F> Finalizer for F
where
    F: FnMut(),
{
    fn finalize(&mut self) {
        self()
    }
}

/// Default handler: logs each line at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLines;

impl<C> LineHandler<C> for LogLines {
    fn handle(&mut self, line: &str, _ctx: &mut C) -> Result<(), HandlerError> {
        info!(line, "received line");
        Ok(())
    }
}

/// The capabilities a reader process runs with.
pub struct Dispatcher<C> {
    initializer: Box<dyn Initializer<C>>,
    handler: Box<dyn LineHandler<C>>,
    finalizer: Option<Box<dyn Finalizer>>,
}

impl<C> Dispatcher<C> {
    /// Dispatcher with the given initializer, logging every line.
    pub fn new<F>(initializer: F) -> Self
    where
        F: FnMut() -> C + 'static,
    {
        Self::with_initializer(initializer)
    }

    pub fn with_initializer<I>(initializer: I) -> Self
    where
        I: Initializer<C> + 'static,
    {
        Self {
            initializer: Box::new(initializer),
            handler: Box::new(LogLines),
            finalizer: None,
        }
    }

    /// Handle lines with a closure.
    pub fn on_line<F>(self, handler: F) -> Self
    where
        F: FnMut(&str, &mut C) -> Result<(), HandlerError> + 'static,
    {
        self.with_handler(handler)
    }

    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: LineHandler<C> + 'static,
    {
        self.handler = Box::new(handler);
        self
    }

    /// Run a closure when the reader loop ends.
    pub fn on_finish<F>(self, finalizer: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.with_finalizer(finalizer)
    }

    pub fn with_finalizer<Fi>(mut self, finalizer: Fi) -> Self
    where
        Fi: Finalizer + 'static,
    {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    pub fn initialize(&mut self) -> C {
        self.initializer.initialize()
    }

    /// Hand `line` to the handler.
    ///
    /// Errors and panics raised by the handler are both returned as
    /// [`DispatchError`]; neither escapes.
    pub fn dispatch(&mut self, line: &str, ctx: &mut C) -> Result<(), DispatchError> {
        let handler = &mut self.handler;
        match catch_unwind(AssertUnwindSafe(|| handler.handle(line, ctx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(DispatchError {
                line: line.to_string(),
                reason: err.to_string(),
            }),
            Err(payload) => Err(DispatchError {
                line: line.to_string(),
                reason: format!("handler panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }

    pub fn finalize(&mut self) {
        if let Some(finalizer) = self.finalizer.as_mut() {
            finalizer.finalize();
        }
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizer.is_some()
    }
}

impl<C> std::fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("finalizer", &self.finalizer.is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn default_handler_accepts_lines() {
        let mut dispatcher = Dispatcher::new(|| 0u32);
        let mut ctx = dispatcher.initialize();
        assert!(dispatcher.dispatch("anything", &mut ctx).is_ok());
        assert!(!dispatcher.has_finalizer());
    }

    #[test]
    fn closure_handler_receives_context() {
        let mut dispatcher =
            Dispatcher::new(Vec::<String>::new).on_line(|line: &str, seen: &mut Vec<String>| {
                seen.push(line.to_uppercase());
                Ok(())
            });

        let mut ctx = dispatcher.initialize();
        dispatcher.dispatch("a", &mut ctx).unwrap();
        dispatcher.dispatch("b", &mut ctx).unwrap();
        assert_eq!(ctx, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn handler_error_is_reported_with_line() {
        let mut dispatcher = Dispatcher::new(|| ()).on_line(|line: &str, _: &mut ()| {
            Err(format!("cannot handle {line}").into())
        });

        let err = dispatcher.dispatch("bad", &mut ()).unwrap_err();
        assert_eq!(err.line, "bad");
        assert_eq!(err.reason, "cannot handle bad");
    }

    #[test]
    fn handler_panic_is_contained() {
        let mut dispatcher = Dispatcher::new(|| ()).on_line(|_: &str, _: &mut ()| panic!("boom"));

        let err = dispatcher.dispatch("explosive", &mut ()).unwrap_err();
        assert_eq!(err.line, "explosive");
        assert!(err.reason.contains("boom"), "reason: {}", err.reason);
    }

    #[test]
    fn finalizer_runs_once_per_call() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut dispatcher = Dispatcher::new(|| ()).on_finish(move || counter.set(counter.get() + 1));

        assert!(dispatcher.has_finalizer());
        dispatcher.finalize();
        assert_eq!(calls.get(), 1);
    }

    struct Counter(u32);

    impl Initializer<u32> for Counter {
        fn initialize(&mut self) -> u32 {
            self.0 += 1;
            self.0
        }
    }

    #[test]
    fn trait_initializer_runs_each_time() {
        let mut dispatcher = Dispatcher::with_initializer(Counter(0));
        assert_eq!(dispatcher.initialize(), 1);
        assert_eq!(dispatcher.initialize(), 2);
    }
}
