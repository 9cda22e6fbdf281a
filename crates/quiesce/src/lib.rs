#![forbid(unsafe_code)]

//! Dirty-checking reactive state container.
//!
//! A [`Scope`] owns an open bag of named [`Value`]s and an ordered list of
//! *watchers*: a value-producing watch function paired with a change-reaction
//! listener. [`Scope::digest`] re-evaluates every watch function until the
//! whole set stabilizes, invoking listeners for each observed change — even
//! when listeners mutate state that earlier watchers depend on.
//!
//! # Architecture
//!
//! Everything is single-threaded and synchronous, built on `Rc<RefCell<..>>`
//! shared ownership. Listeners may mutate scope properties and register new
//! watchers while a digest is in progress; both effects are visible to the
//! remainder of the same digest.
//!
//! # Invariants
//!
//! 1. Watchers are scanned in registration order.
//! 2. After `digest()` returns `Ok`, every watcher's recorded value equals
//!    what its watch function currently produces.
//! 3. A listener fires exactly once per change its watcher produced, and at
//!    least once after registration (first evaluation always counts as a
//!    change, even for a watched value of `Undefined`).
//! 4. A digest either converges or fails synchronously after ten dirty
//!    passes with [`DigestError::NonConvergent`]; there is no partial
//!    success.
//!
//! # Example
//!
//! ```
//! use quiesce::Scope;
//!
//! let scope = Scope::new();
//! scope.set("name", "Jane");
//!
//! scope.watch(
//!     |s| s.get("name"),
//!     |new, _old, s| {
//!         if let Some(name) = new.as_str() {
//!             s.set("initial", &name[..1]);
//!         }
//!     },
//! );
//!
//! scope.digest().unwrap();
//! assert_eq!(scope.get("initial").as_str(), Some("J"));
//! ```

pub mod error;
pub mod scope;
pub mod value;

pub use error::{DigestError, Result};
pub use scope::Scope;
pub use value::{Equality, Value};
