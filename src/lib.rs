//! # dip
//!
//! A note-keyed dependency resolution and lifecycle engine: register
//! providers of values under symbolic names ("notes"), declare which notes a
//! consumer function needs, and let an [`Injector`] resolve, cache and
//! supply those values — then tear down whatever was created, in reverse
//! construction order.
//!
//! The point is to declare a dependency's *name* at the call site and defer
//! the choice of *implementation* to a composition root. Nothing is
//! discovered from type information: every consumer explicitly declares the
//! notes it needs.
//!
//! ## Core Concepts
//!
//! - **Note**: a token naming one dependency request, `"object"` or
//!   `"object:qualifier"`, or a structured directive ([`maybe`],
//!   [`partial`], [`eager_partial`])
//! - **Annotation**: the positional and keyword notes attached to a
//!   consumer callable, exactly once, via [`annotate`]
//! - **Namespace**: a registration scope with its own provider table and an
//!   explicit inheritance chain; a child's registration shadows an
//!   ancestor's without erasing it
//! - **Provider**: anything able to answer `get(qualifier)` and be torn
//!   down via `close()` — a constant, a plain factory, a constructible
//!   provider type, or a two-phase setup routine
//! - **Injector**: the resolver; memoizes unqualified values, constructs
//!   each provider at most once, and closes them in reverse order
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use dip::{Annotation, CallArgs, Injector, Namespace, annotate, callable, value};
//!
//! let mut ns = Namespace::new("app");
//! ns.register_value("x", 6i64)?;
//! ns.register_value("y", 7i64)?;
//!
//! let multiply = callable(|args: CallArgs| {
//!     let x: i64 = *args.arg(0)?;
//!     let y: i64 = *args.arg(1)?;
//!     Ok(value(x * y))
//! });
//! annotate(&multiply, Annotation::new().note("x").note("y"))?;
//!
//! let injector = Injector::new(Arc::new(ns));
//! let product = injector.apply(&multiply, CallArgs::new())?;
//! assert_eq!(*product.downcast_ref::<i64>().unwrap(), 42);
//! injector.close()?;
//! # Ok::<(), dip::InjectError>(())
//! ```
//!
//! ## Two-Phase Providers
//!
//! A provider that holds a resource implements setup and teardown as one
//! cooperative routine. The routine must yield its initial value at least
//! once; qualifier-aware routines keep answering qualified lookups until the
//! injector closes them:
//!
//! ```rust
//! use std::sync::Arc;
//! use dip::{Injector, Namespace, Resume, Routine, Step, routine_factory, value};
//!
//! let mut ns = Namespace::new("app");
//! ns.register_routine("thing", true, routine_factory(|_args| {
//!     let routine: Routine = Box::new(|resume| match resume {
//!         Resume::Start => Ok(Step::Yielded(value("thing without a name".to_string()))),
//!         Resume::Qualifier(name) => Ok(Step::Yielded(value(format!("thing with name '{name}'")))),
//!         Resume::Cancel | Resume::Finish => Ok(Step::Finished),
//!     });
//!     Ok(routine)
//! }))?;
//!
//! let injector = Injector::new(Arc::new(ns));
//! assert_eq!(injector.get_as::<String>("thing")?, "thing without a name");
//! assert_eq!(injector.get_as::<String>("thing:foo")?, "thing with name 'foo'");
//! injector.close()?;
//! # Ok::<(), dip::InjectError>(())
//! ```
//!
//! ## Scoped Use
//!
//! [`Injector::with`] runs a body against a fresh injector and closes it on
//! every exit path, including failure.

mod annotation;
mod call;
mod error;
mod injector;
mod note;
mod provider;
mod registry;

pub use annotation::*;
pub use call::*;
pub use error::*;
pub use injector::*;
pub use note::*;
pub use provider::*;
pub use registry::*;
