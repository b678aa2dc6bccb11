//! Guarded execution with named lifecycle hooks.
//!
//! A [`LifecycleBuilder`] collects handlers per event name and is consumed by
//! [`LifecycleBuilder::build`], so a [`LifecycleController`] can never gain
//! handlers after it starts running work.
//!
//! [`LifecycleController::attempt`] runs a unit of work as
//!
//! ```text
//! prepare → work → success | failure → finish
//! ```
//!
//! Work signals an early exit by returning [`Outcome::Aborted`]. A
//! [`Abort::Scoped`] exit skips `success` for that one call only; an
//! [`Abort::Persistent`] exit additionally turns every later `attempt` on the
//! same controller into a no-op.
//!
//! The controller keeps its abort flag in a `Cell` and is meant for
//! single-sequence use; it is deliberately not `Sync`.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;

/// Fired before work runs.
pub const PREPARE: &str = "prepare";
/// Fired after work completed without abort or error.
pub const SUCCESS: &str = "success";
/// Fired with the error when prepare, work or success failed.
pub const FAILURE: &str = "failure";
/// Fired exactly once per non-skipped attempt, whatever the outcome.
pub const FINISH: &str = "finish";

// ---------------------------------------------------------------------------
// Hook arguments
// ---------------------------------------------------------------------------

/// What a handler receives when its event fires.
///
/// Without a scope the handler runs with no arguments: both `scope` and
/// `error` are `None`.
pub struct Hook<'a, C, E> {
    pub event: &'a str,
    pub scope: Option<&'a C>,
    pub error: Option<&'a E>,
}

type Handler<C, E> = Box<dyn Fn(&Hook<'_, C, E>) -> Result<(), E>>;

// ---------------------------------------------------------------------------
// Work outcome
// ---------------------------------------------------------------------------

/// How far an abort reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    /// Ends the current attempt only.
    Scoped,
    /// Ends the current attempt and disables the controller.
    Persistent,
}

/// Value returned by work passed to [`LifecycleController::attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Aborted(Abort),
}

impl<T> Outcome<T> {
    /// Scoped early exit.
    pub fn abort() -> Self {
        Outcome::Aborted(Abort::Scoped)
    }

    /// Early exit that also disables every later attempt.
    pub fn abort_persistent() -> Self {
        Outcome::Aborted(Abort::Persistent)
    }
}

/// Result of a non-failing [`LifecycleController::attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// Work completed and `success` fired.
    Completed(T),
    /// Work aborted; `success` was skipped.
    Aborted,
    /// Work failed and a `failure` handler took care of it.
    Recovered,
    /// The controller was persistently aborted; nothing ran.
    Skipped,
}

impl<T> Attempt<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Attempt::Completed(value) => Some(value),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Mutable handler collector. Consumed by [`build`](Self::build).
pub struct LifecycleBuilder<C, E> {
    handlers: HashMap<String, Vec<Handler<C, E>>>,
}

impl<C, E> Default for LifecycleBuilder<C, E> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C, E> LifecycleBuilder<C, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the handlers of `event`.
    ///
    /// Order is preserved and the same closure may be registered twice.
    pub fn on<F>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(&Hook<'_, C, E>) -> Result<(), E> + 'static,
    {
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(Box::new(handler));
        self
    }

    pub fn build(self) -> LifecycleController<C, E> {
        LifecycleController {
            handlers: self.handlers,
            aborted: Cell::new(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Immutable handler registry plus the persistent-abort flag.
pub struct LifecycleController<C, E> {
    handlers: HashMap<String, Vec<Handler<C, E>>>,
    aborted: Cell<bool>,
}

impl<C, E> fmt::Debug for LifecycleController<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<(&str, usize)> = self
            .handlers
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        events.sort();
        f.debug_struct("LifecycleController")
            .field("events", &events)
            .field("aborted", &self.aborted.get())
            .finish()
    }
}

impl<C, E: fmt::Display> LifecycleController<C, E> {
    /// `true` once work returned [`Abort::Persistent`].
    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    /// Invoke every handler of `event` in registration order.
    ///
    /// Returns `Ok(false)` without invoking anything when no handler is
    /// registered. The first handler error stops the dispatch and is returned.
    pub fn fire(&self, event: &str, scope: Option<&C>, error: Option<&E>) -> Result<bool, E> {
        let Some(handlers) = self.handlers.get(event).filter(|h| !h.is_empty()) else {
            return Ok(false);
        };
        let hook = Hook {
            event,
            scope,
            error: scope.and(error),
        };
        for handler in handlers {
            handler(&hook)?;
        }
        Ok(true)
    }

    /// Run `work` between the lifecycle hooks.
    ///
    /// Errors raised by `prepare`, `work` or `success` are passed to the
    /// `failure` handlers; the error is swallowed when they all complete and
    /// returned to the caller when none is registered or one of them fails.
    /// `finish` fires exactly once before returning either way; an error it
    /// raises is logged and never masks the primary outcome.
    pub fn attempt<T, W>(&self, scope: Option<&C>, work: W) -> Result<Attempt<T>, E>
    where
        W: FnOnce() -> Result<Outcome<T>, E>,
    {
        if self.aborted.get() {
            tracing::debug!("controller aborted; skipping attempt");
            return Ok(Attempt::Skipped);
        }

        let result = match self.guarded(scope, work) {
            Ok(Outcome::Completed(value)) => Ok(Attempt::Completed(value)),
            Ok(Outcome::Aborted(abort)) => {
                if abort == Abort::Persistent {
                    self.aborted.set(true);
                }
                tracing::debug!(?abort, "attempt aborted");
                Ok(Attempt::Aborted)
            }
            Err(err) => match self.fire(FAILURE, scope, Some(&err)) {
                Ok(true) => Ok(Attempt::Recovered),
                Ok(false) => Err(err),
                Err(hook_err) => {
                    tracing::warn!(error = %hook_err, "failure hook raised");
                    Err(err)
                }
            },
        };

        if let Err(hook_err) = self.fire(FINISH, scope, None) {
            tracing::warn!(error = %hook_err, "finish hook raised");
        }
        result
    }

    fn guarded<T, W>(&self, scope: Option<&C>, work: W) -> Result<Outcome<T>, E>
    where
        W: FnOnce() -> Result<Outcome<T>, E>,
    {
        self.fire(PREPARE, scope, None)?;
        let outcome = work()?;
        if let Outcome::Completed(_) = outcome {
            self.fire(SUCCESS, scope, None)?;
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    struct Boom(&'static str);

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn recording(log: &Log) -> LifecycleBuilder<String, Boom> {
        let mut builder = LifecycleBuilder::new();
        for event in [PREPARE, SUCCESS, FAILURE, FINISH] {
            let log = Rc::clone(log);
            builder = builder.on(event, move |hook: &Hook<'_, String, Boom>| {
                log.borrow_mut().push(hook.event.to_string());
                Ok(())
            });
        }
        builder
    }

    #[test]
    fn fire_runs_handlers_in_registration_order() {
        let log: Log = Rc::default();
        let mut builder = LifecycleBuilder::<String, Boom>::new();
        for n in 0..3 {
            let log = Rc::clone(&log);
            builder = builder.on("tick", move |_| {
                log.borrow_mut().push(format!("h{n}"));
                Ok(())
            });
        }
        let controller = builder.build();
        assert_eq!(controller.fire("tick", None, None), Ok(true));
        assert_eq!(*log.borrow(), vec!["h0", "h1", "h2"]);
    }

    #[test]
    fn fire_without_handlers_returns_false() {
        let controller = LifecycleBuilder::<String, Boom>::new().build();
        assert_eq!(controller.fire("nothing", None, None), Ok(false));
    }

    #[test]
    fn hook_sees_scope_and_error_only_with_scope() {
        let seen: Rc<RefCell<Vec<(bool, bool)>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let controller = LifecycleBuilder::<String, Boom>::new()
            .on("inspect", move |hook| {
                sink.borrow_mut()
                    .push((hook.scope.is_some(), hook.error.is_some()));
                Ok(())
            })
            .build();
        let scope = "data/app".to_string();
        controller.fire("inspect", Some(&scope), Some(&Boom("x"))).unwrap();
        controller.fire("inspect", None, Some(&Boom("x"))).unwrap();
        assert_eq!(*seen.borrow(), vec![(true, true), (false, false)]);
    }

    #[test]
    fn completed_attempt_fires_full_sequence() {
        let log: Log = Rc::default();
        let controller = recording(&log).build();
        let scope = "s".to_string();
        let result = controller.attempt(Some(&scope), || Ok(Outcome::Completed(7)));
        assert_eq!(result, Ok(Attempt::Completed(7)));
        assert_eq!(*log.borrow(), vec!["prepare", "success", "finish"]);
    }

    #[test]
    fn scoped_abort_skips_success_but_not_finish() {
        let log: Log = Rc::default();
        let controller = recording(&log).build();
        let result = controller.attempt(None, || Ok(Outcome::<()>::abort()));
        assert_eq!(result, Ok(Attempt::Aborted));
        assert_eq!(*log.borrow(), vec!["prepare", "finish"]);

        let again = controller.attempt(None, || Ok(Outcome::Completed(())));
        assert_eq!(again, Ok(Attempt::Completed(())));
        assert!(!controller.is_aborted());
    }

    #[test]
    fn persistent_abort_disables_later_attempts() {
        let log: Log = Rc::default();
        let controller = recording(&log).build();
        controller
            .attempt(None, || Ok(Outcome::<()>::abort_persistent()))
            .unwrap();
        log.borrow_mut().clear();

        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let result = controller.attempt(None, move || {
            flag.set(true);
            Ok(Outcome::Completed(()))
        });
        assert_eq!(result, Ok(Attempt::Skipped));
        assert!(!ran.get());
        assert!(log.borrow().is_empty(), "nothing may fire after persistent abort");
    }

    #[test]
    fn unhandled_error_propagates_after_finish() {
        let log: Log = Rc::default();
        let finish_log = Rc::clone(&log);
        let controller = LifecycleBuilder::<String, Boom>::new()
            .on(FINISH, move |_| {
                finish_log.borrow_mut().push("finish".into());
                Ok(())
            })
            .build();
        let result = controller.attempt(None, || Err::<Outcome<()>, _>(Boom("rsync died")));
        assert_eq!(result, Err(Boom("rsync died")));
        assert_eq!(*log.borrow(), vec!["finish"]);
    }

    #[test]
    fn handled_error_is_swallowed_after_finish() {
        let log: Log = Rc::default();
        let controller = recording(&log).build();
        let scope = "s".to_string();
        let result = controller.attempt(Some(&scope), || Err::<Outcome<()>, _>(Boom("x")));
        assert_eq!(result, Ok(Attempt::Recovered));
        assert_eq!(*log.borrow(), vec!["prepare", "failure", "finish"]);
    }

    #[test]
    fn failing_failure_handler_reraises_original_error() {
        let controller = LifecycleBuilder::<String, Boom>::new()
            .on(FAILURE, |_| Err(Boom("handler broke")))
            .build();
        let result = controller.attempt(None, || Err::<Outcome<()>, _>(Boom("work broke")));
        assert_eq!(result, Err(Boom("work broke")));
    }

    #[test]
    fn prepare_error_routes_through_failure() {
        let log: Log = Rc::default();
        let sink = Rc::clone(&log);
        let controller = LifecycleBuilder::<String, Boom>::new()
            .on(PREPARE, |_| Err(Boom("no space")))
            .on(FAILURE, move |hook| {
                let msg = hook.error.map(|e| e.to_string()).unwrap_or_default();
                sink.borrow_mut().push(msg);
                Ok(())
            })
            .build();
        let scope = "s".to_string();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let result = controller.attempt(Some(&scope), move || {
            flag.set(true);
            Ok(Outcome::Completed(()))
        });
        assert_eq!(result, Ok(Attempt::Recovered));
        assert!(!ran.get(), "work must not run when prepare fails");
        assert_eq!(*log.borrow(), vec!["no space"]);
    }

    #[test]
    fn finish_error_does_not_mask_success() {
        let controller = LifecycleBuilder::<String, Boom>::new()
            .on(FINISH, |_| Err(Boom("late")))
            .build();
        let result = controller.attempt(None, || Ok(Outcome::Completed(1)));
        assert_eq!(result, Ok(Attempt::Completed(1)));
    }
}
