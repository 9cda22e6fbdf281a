#![forbid(unsafe_code)]

//! The scope engine: property bag, watcher registry, digest loop.
//!
//! # Design
//!
//! A [`Scope`] is built entirely on interior mutability so that every caller
//! — application code, watch functions, listeners — works through `&Scope`.
//! Watchers live in a growable `Vec<Rc<RefCell<Watcher>>>`; the digest scan
//! indexes the live vector on every step instead of holding an iterator, so
//! watchers appended by a listener mid-digest are still visited by the scan
//! that is already running.
//!
//! The digest repeats full scans until one pass finds no change. A "last
//! dirty watcher" pointer short-circuits the confirmation pass: once the
//! scan returns to the most recently dirty watcher and finds it clean, every
//! watcher in between was clean too, and the scope is proven stable without
//! finishing the pass. For N independent watchers this costs N evaluations
//! on the confirming sweep the first time, and only as many as needed to
//! revisit the change point afterwards.
//!
//! # Invariants
//!
//! 1. Watchers are evaluated in registration order.
//! 2. A watcher's recorded value is updated exactly when a change is
//!    detected, *before* its listener runs; a panicking listener cannot
//!    leave the record stale.
//! 3. On a watcher's first evaluation the listener sees `old == new`; the
//!    internal unset sentinel is never exposed.
//! 4. Structural watchers record a deep copy, never a handle into
//!    application-owned state.
//! 5. The short-circuit pointer is cleared by every registration, so a
//!    watcher added mid-digest can never be skipped by the stability proof.
//!
//! # Failure Modes
//!
//! - **Non-convergence**: watchers that keep dirtying each other exhaust the
//!   ten-pass budget and `digest()` returns [`DigestError::NonConvergent`].
//! - **Panicking watch/listener**: the panic unwinds through `digest()` to
//!   the caller; remaining watchers are not scanned and no success is
//!   reported. Subsequent digests see consistent bookkeeping.
//! - **Re-entrant `digest()`**: calling `digest()` from inside a listener or
//!   watch function is not supported and panics on the watcher borrow.
//!   Registration and property mutation from listeners are fully supported.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::{trace, warn};

use crate::error::{DigestError, Result};
use crate::value::{Equality, Value};

/// Dirty scan passes allowed before a digest gives up.
const DIGEST_TTL: u32 = 10;

type WatchFn = Box<dyn Fn(&Scope) -> Value>;
type ListenerFn = Box<dyn FnMut(&Value, &Value, &Scope)>;

/// Last value observed by a watcher.
///
/// `Unset` is the registration sentinel: distinguishable from every legal
/// [`Value`] (including `Undefined` and `Null`), so the first evaluation is
/// always treated as a change.
enum Last {
    Unset,
    Seen(Value),
}

struct Watcher {
    watch: WatchFn,
    listener: ListenerFn,
    equality: Equality,
    last: Last,
}

/// A dirty-checking reactive state container.
///
/// See the [crate docs](crate) for the overall contract and an example.
#[derive(Default)]
pub struct Scope {
    props: RefCell<AHashMap<String, Value>>,
    watchers: RefCell<Vec<Rc<RefCell<Watcher>>>>,
    /// Most recently dirty watcher; `None` means "no stability proof yet".
    last_dirty: RefCell<Option<Rc<RefCell<Watcher>>>>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("props", &self.props.borrow())
            .field("watchers", &self.watchers.borrow().len())
            .finish()
    }
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Property bag ────────────────────────────────────────────────────

    /// Read a property. Unset properties read as [`Value::Undefined`].
    ///
    /// Returns a clone of the stored value; container values share their
    /// handle with the bag, so mutating through the returned handle mutates
    /// the scope state.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.props
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    /// Write a property. Legal at any time, including from listeners and
    /// watch functions during a digest.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.props.borrow_mut().insert(key.into(), value.into());
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.props.borrow().contains_key(key)
    }

    /// Number of registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.borrow().len()
    }

    // ── Watcher registration ────────────────────────────────────────────

    /// Register a watcher with identity comparison (the default mode).
    ///
    /// `watch` produces the observed value from the scope; `listener` is
    /// invoked as `(new, old, scope)` whenever that value changes between
    /// stable digests. Registration inside a listener is legal and the new
    /// watcher is visited by the digest already in progress.
    pub fn watch(
        &self,
        watch: impl Fn(&Scope) -> Value + 'static,
        listener: impl FnMut(&Value, &Value, &Scope) + 'static,
    ) {
        self.register(Box::new(watch), Box::new(listener), Equality::Identity);
    }

    /// Register a watcher with structural comparison.
    ///
    /// The recorded value is a deep copy of the observation, so in-place
    /// mutation of a watched container is detected on the next digest.
    pub fn watch_by_value(
        &self,
        watch: impl Fn(&Scope) -> Value + 'static,
        listener: impl FnMut(&Value, &Value, &Scope) + 'static,
    ) {
        self.register(Box::new(watch), Box::new(listener), Equality::Structural);
    }

    /// Register a watch function with no listener.
    ///
    /// The watch function still runs on every digest pass, which is useful
    /// when it carries its own side effects.
    pub fn watch_effect(&self, watch: impl Fn(&Scope) -> Value + 'static) {
        self.register(Box::new(watch), Box::new(|_, _, _| {}), Equality::Identity);
    }

    /// Register a watcher with an explicit comparison mode.
    pub fn watch_with(
        &self,
        watch: impl Fn(&Scope) -> Value + 'static,
        listener: impl FnMut(&Value, &Value, &Scope) + 'static,
        equality: Equality,
    ) {
        self.register(Box::new(watch), Box::new(listener), equality);
    }

    fn register(&self, watch: WatchFn, listener: ListenerFn, equality: Equality) {
        self.watchers.borrow_mut().push(Rc::new(RefCell::new(Watcher {
            watch,
            listener,
            equality,
            last: Last::Unset,
        })));
        // A watcher registered mid-digest has never been evaluated; the
        // stability proof must not fire before the scan reaches it.
        self.last_dirty.borrow_mut().take();
    }

    // ── Digest ──────────────────────────────────────────────────────────

    /// Run watch functions until the scope stabilizes.
    ///
    /// Scans all watchers in registration order, firing listeners for every
    /// change, and repeats until a pass proves stability. Listener-driven
    /// cascades (a listener mutating state an earlier watcher depends on)
    /// are resolved within this single call.
    ///
    /// # Errors
    ///
    /// [`DigestError::NonConvergent`] when the watcher graph keeps changing
    /// past the ten-pass budget. No partial success is reported; the caller
    /// must treat the scope as unstable.
    pub fn digest(&self) -> Result<()> {
        self.last_dirty.borrow_mut().take();
        let mut ttl = DIGEST_TTL;
        let mut pass = 0u32;
        loop {
            let dirty = self.digest_once();
            pass += 1;
            trace!(pass, dirty, "digest pass complete");
            if !dirty {
                break;
            }
            if ttl == 0 {
                let watchers = self.watcher_count();
                warn!(pass, watchers, "digest iteration budget exhausted");
                return Err(DigestError::NonConvergent {
                    budget: DIGEST_TTL,
                    watchers,
                });
            }
            ttl -= 1;
        }
        Ok(())
    }

    /// One scan over the watcher sequence. Returns whether anything changed.
    ///
    /// Returns `false` immediately when the scan reaches the remembered
    /// last-dirty watcher and finds it clean: every watcher between it and
    /// the scan position was clean too, so the scope is stable.
    fn digest_once(&self) -> bool {
        let mut dirty = false;
        let mut index = 0;
        loop {
            // Index into the live vector: listeners invoked below may have
            // appended watchers this scan must still visit.
            let watcher = {
                let watchers = self.watchers.borrow();
                match watchers.get(index) {
                    Some(w) => Rc::clone(w),
                    None => break,
                }
            };
            index += 1;

            let new = {
                let w = watcher.borrow();
                (w.watch)(self)
            };
            let changed = {
                let w = watcher.borrow();
                match &w.last {
                    Last::Unset => true,
                    Last::Seen(old) => !new.equals(old, w.equality),
                }
            };

            if changed {
                let old = {
                    let mut w = watcher.borrow_mut();
                    let snapshot = match w.equality {
                        Equality::Identity => new.clone(),
                        Equality::Structural => new.deep_clone(),
                    };
                    match std::mem::replace(&mut w.last, Last::Seen(snapshot)) {
                        // First evaluation: the sentinel is not a real old
                        // value, so the listener sees old == new.
                        Last::Unset => new.clone(),
                        Last::Seen(value) => value,
                    }
                };
                *self.last_dirty.borrow_mut() = Some(Rc::clone(&watcher));
                dirty = true;
                let mut w = watcher.borrow_mut();
                (w.listener)(&new, &old, self);
            } else {
                let stable = self
                    .last_dirty
                    .borrow()
                    .as_ref()
                    .is_some_and(|w| Rc::ptr_eq(w, &watcher));
                if stable {
                    return false;
                }
            }
        }
        dirty
    }

    // ── Immediate evaluation ────────────────────────────────────────────

    /// Evaluate `expr` against this scope right now and return its result.
    ///
    /// No scheduling, no interaction with the digest loop; may be called
    /// from inside or outside a digest.
    pub fn eval<R>(&self, expr: impl FnOnce(&Scope) -> R) -> R {
        expr(self)
    }

    /// Like [`eval`](Scope::eval), passing `locals` straight through to the
    /// expression.
    pub fn eval_with<L, R>(&self, expr: impl FnOnce(&Scope, L) -> R, locals: L) -> R {
        expr(self, locals)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
