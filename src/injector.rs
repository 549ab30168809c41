use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::annotation::{get_annotation, has_annotation};
use crate::{
    Annotation, CallArgs, Callable, InjectError, Namespace, Note, PartialDirective, Provider,
    ProviderEntry, RoutineProvider, Value,
};

type Instance = Arc<Mutex<Box<dyn Provider>>>;

/// The resolver: looks up providers in a namespace chain, materializes and
/// memoizes values, applies annotated functions, and tears everything down
/// in reverse construction order.
///
/// An `Injector` is a cheap clone handle over shared state, created open and
/// closed exactly once by [`close`](Injector::close). Memoized unqualified
/// values are stable for the injector's lifetime, and each provider is
/// constructed at most once per injector.
///
/// The engine is single-threaded and cooperative by contract: internal maps
/// are lock-guarded only so handles stay `Send + Sync`, and no guard is held
/// across a provider or consumer callback.
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

struct InjectorInner {
    registry: Arc<Namespace>,
    /// Live provider objects, one per base note.
    instances: DashMap<String, Instance>,
    /// Unqualified memo cache. Qualified lookups never land here: distinct
    /// qualifiers may legitimately produce distinct values.
    values: DashMap<String, Value>,
    /// Base notes in first-successful-resolution order; close runs it in
    /// reverse.
    construction_order: Mutex<Vec<String>>,
    /// Request counts per note, bumped before resolution so failed lookups
    /// are observable.
    stats: DashMap<String, u64>,
    closed: AtomicBool,
}

impl Injector {
    /// Creates an open injector resolving against `registry`.
    pub fn new(registry: Arc<Namespace>) -> Self {
        Self {
            inner: Arc::new(InjectorInner {
                registry,
                instances: DashMap::new(),
                values: DashMap::new(),
                construction_order: Mutex::new(Vec::new()),
                stats: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Runs `body` against a fresh injector over `registry`, closing it on
    /// every exit path. A close failure after a successful body is
    /// reported; after a failed body, the body's error wins and the close
    /// failure is only logged.
    pub fn with<R>(
        registry: Arc<Namespace>,
        body: impl FnOnce(&Injector) -> Result<R, InjectError>,
    ) -> Result<R, InjectError> {
        let injector = Injector::new(registry);
        let result = body(&injector);
        let closed = injector.close();
        match result {
            Ok(v) => {
                closed?;
                Ok(v)
            }
            Err(e) => {
                if let Err(close_err) = closed {
                    tracing::warn!(error = %close_err, "Close failed after scoped body error");
                }
                Err(e)
            }
        }
    }

    pub fn registry(&self) -> &Arc<Namespace> {
        &self.inner.registry
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of per-note request counts, keyed by the note's display
    /// form.
    pub fn stats(&self) -> HashMap<String, u64> {
        self.inner
            .stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Resolves a note into a value.
    pub fn get(&self, note: impl Into<Note>) -> Result<Value, InjectError> {
        self.resolve(&note.into())
    }

    /// Resolves a note and clones the concrete `T` out of the value.
    pub fn get_as<T>(&self, note: impl Into<Note>) -> Result<T, InjectError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let v = self.get(note)?;
        crate::value_ref::<T>(&v).cloned()
    }

    /// Fully applies an annotated callable: resolves its notes, appends
    /// `extra` positionals after the resolved ones, lets `extra` keywords
    /// override resolved ones, and calls it.
    pub fn apply(&self, func: &Callable, extra: CallArgs) -> Result<Value, InjectError> {
        let annotation = get_annotation(func)?;
        self.apply_annotation(func, &annotation, extra)
    }

    /// Like [`apply`](Injector::apply), with an explicit annotation instead
    /// of the one in the store. Lets one callable be applied under
    /// different declarations.
    pub fn apply_annotation(
        &self,
        func: &Callable,
        annotation: &Annotation,
        extra: CallArgs,
    ) -> Result<Value, InjectError> {
        if self.is_closed() {
            return Err(InjectError::InjectorClosed);
        }
        let mut resolved = self.resolve_annotation(annotation, false)?;
        resolved.args.extend(extra.args);
        resolved.kwargs.extend(extra.kwargs);
        func(resolved)
    }

    /// Produces a deferred application of `func` with `bound` arguments.
    /// The wrapper resolves `func`'s annotation on its first invocation and
    /// caches the result for the wrapper's lifetime.
    pub fn partial(&self, func: &Callable, bound: CallArgs) -> Result<Arc<PartialFn>, InjectError> {
        let note = crate::partial(func.clone(), bound);
        downcast_partial(self.resolve(&note)?)
    }

    /// Like [`partial`](Injector::partial), but the annotation is resolved
    /// immediately.
    pub fn eager_partial(
        &self,
        func: &Callable,
        bound: CallArgs,
    ) -> Result<Arc<PartialFn>, InjectError> {
        let note = crate::eager_partial(func.clone(), bound);
        downcast_partial(self.resolve(&note)?)
    }

    /// Closes every provider instance constructed by this injector, in
    /// reverse construction order, each exactly once, then marks the
    /// injector closed. Provider close failures are not suppressed: every
    /// remaining instance is still attempted and the first failure is
    /// returned.
    pub fn close(&self) -> Result<(), InjectError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(InjectError::InjectorClosed);
        }
        let order = lock(&self.inner.construction_order).clone();
        let mut first_err = None;
        for base in order.iter().rev() {
            // Plain factories never produced an instance; nothing to close.
            let Some((_, instance)) = self.inner.instances.remove(base) else {
                continue;
            };
            tracing::debug!(note = %base, "Closing provider");
            if let Err(e) = lock(&instance).close() {
                tracing::warn!(note = %base, error = %e, "Provider close failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn resolve(&self, note: &Note) -> Result<Value, InjectError> {
        if self.is_closed() {
            return Err(InjectError::InjectorClosed);
        }
        // Counted before any fallible work so failed lookups show up too.
        *self.inner.stats.entry(note.to_string()).or_insert(0) += 1;
        match note {
            Note::Partial(directive) => {
                let wrapper: Value = self.make_partial(directive, false)?;
                Ok(wrapper)
            }
            Note::EagerPartial(directive) => {
                let wrapper: Value = self.make_partial(directive, true)?;
                Ok(wrapper)
            }
            Note::Maybe(inner) => match inner.as_ref() {
                Note::Plain { base, qualifier } => {
                    self.resolve_plain(base, qualifier.as_deref(), inner)
                }
                other => Err(InjectError::InvalidNote(format!(
                    "maybe may only wrap a plain note, got `{other}`"
                ))),
            },
            Note::Plain { base, qualifier } => self.resolve_plain(base, qualifier.as_deref(), note),
        }
    }

    fn resolve_plain(
        &self,
        base: &str,
        qualifier: Option<&str>,
        note: &Note,
    ) -> Result<Value, InjectError> {
        if qualifier.is_none()
            && let Some(cached) = self.inner.values.get(base).map(|v| v.value().clone())
        {
            tracing::trace!(note = %note, "Resolved from memo cache");
            return Ok(cached);
        }
        let entry = self
            .inner
            .registry
            .lookup(base)
            .ok_or_else(|| InjectError::Unresolvable(note.to_string()))?;
        let value = match self.dispatch(base, qualifier, entry) {
            Ok(v) => v,
            // A provider signaled "currently unavailable": enrich with the
            // originating note for diagnostics, propagate otherwise intact.
            Err(InjectError::CurrentlyUnavailable { .. }) => {
                return Err(InjectError::CurrentlyUnavailable {
                    note: note.to_string(),
                });
            }
            Err(e) => return Err(e),
        };
        if qualifier.is_none() {
            self.inner.values.insert(base.to_string(), value.clone());
        }
        self.record_construction(base);
        Ok(value)
    }

    fn dispatch(
        &self,
        base: &str,
        qualifier: Option<&str>,
        entry: &ProviderEntry,
    ) -> Result<Value, InjectError> {
        // A live instance always wins over re-construction.
        if let Some(instance) = self.instance(base) {
            return lock(&instance).get(qualifier);
        }
        match entry {
            ProviderEntry::Value(v) => match qualifier {
                Some(q) => Err(InjectError::UnsupportedQualifiedLookup(q.to_string())),
                None => Ok(v.clone()),
            },
            ProviderEntry::ProviderType(constructor) => {
                tracing::debug!(note = %base, "Constructing provider");
                let args = if has_annotation(constructor) {
                    self.resolve_annotation(&get_annotation(constructor)?, false)?
                } else {
                    CallArgs::new()
                };
                let instance: Instance = Arc::new(Mutex::new(constructor(args)?));
                self.inner.instances.insert(base.to_string(), instance.clone());
                // Recorded at insertion so the instance is closed even when
                // the very first get on it fails.
                self.record_construction(base);
                lock(&instance).get(qualifier)
            }
            ProviderEntry::Routine {
                factory,
                qualifier_aware,
            } => {
                tracing::debug!(note = %base, qualifier_aware, "Initializing routine provider");
                let args = if has_annotation(factory) {
                    self.resolve_annotation(&get_annotation(factory)?, false)?
                } else {
                    CallArgs::new()
                };
                let mut provider = RoutineProvider::new(factory.clone(), *qualifier_aware);
                let initial = provider.init(args)?;
                let boxed: Box<dyn Provider> = Box::new(provider);
                let instance: Instance = Arc::new(Mutex::new(boxed));
                self.inner.instances.insert(base.to_string(), instance.clone());
                self.record_construction(base);
                // The initial value is the answer for the unqualified
                // request that triggered construction; it also seeds the
                // memo cache even when the trigger was qualified.
                self.inner.values.insert(base.to_string(), initial.clone());
                match qualifier {
                    None => Ok(initial),
                    Some(_) => lock(&instance).get(qualifier),
                }
            }
            ProviderEntry::Factory(factory) => {
                let args = if has_annotation(factory) {
                    // An annotated producing function is a deferred call:
                    // its keyword notes are implicitly `maybe`.
                    self.resolve_annotation(&get_annotation(factory)?, true)?
                } else {
                    CallArgs::new()
                };
                factory(args, qualifier)
            }
        }
    }

    /// Resolves an annotation into a concrete call payload. With
    /// `implicit_maybe`, every keyword note drops on unresolvable results,
    /// not just the explicitly wrapped ones; positional failures are always
    /// fatal.
    fn resolve_annotation(
        &self,
        annotation: &Annotation,
        implicit_maybe: bool,
    ) -> Result<CallArgs, InjectError> {
        let mut args = Vec::with_capacity(annotation.notes.len());
        for note in &annotation.notes {
            args.push(self.resolve(note)?);
        }
        let mut kwargs = BTreeMap::new();
        for (name, note) in &annotation.keyword_notes {
            let (target, soft) = match note {
                Note::Maybe(_) => (note, true),
                other => (other, implicit_maybe),
            };
            match self.resolve(target) {
                Ok(v) => {
                    kwargs.insert(name.clone(), v);
                }
                Err(e) if soft && e.is_unresolvable() => {
                    tracing::debug!(keyword = %name, note = %note, "Dropping unavailable keyword");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(CallArgs { args, kwargs })
    }

    fn make_partial(
        &self,
        directive: &PartialDirective,
        eager: bool,
    ) -> Result<Arc<PartialFn>, InjectError> {
        let wrapper = Arc::new(PartialFn {
            injector: self.clone(),
            func: directive.func.clone(),
            bound: directive.bound.clone(),
            resolved: Mutex::new(None),
        });
        if eager {
            wrapper.resolve_args()?;
        }
        Ok(wrapper)
    }

    fn instance(&self, base: &str) -> Option<Instance> {
        self.inner.instances.get(base).map(|i| i.value().clone())
    }

    fn record_construction(&self, base: &str) {
        let mut order = lock(&self.inner.construction_order);
        if !order.iter().any(|b| b == base) {
            order.push(base.to_string());
        }
    }
}

/// A deferred application produced by resolving a `partial` or
/// `eager_partial` directive.
///
/// The wrapper resolves its function's annotation at most once — on first
/// invocation for lazy wrappers, at directive resolution for eager ones —
/// and reuses the resolved arguments for every later call. During that
/// resolution all keyword notes behave as if wrapped in `maybe`.
///
/// Call-time argument order: resolved positionals, then the positionals
/// bound when the directive was built, then call-time positionals. Keyword
/// layers merge in the same order, later layers overriding.
pub struct PartialFn {
    injector: Injector,
    func: Callable,
    bound: CallArgs,
    resolved: Mutex<Option<CallArgs>>,
}

impl PartialFn {
    /// Invokes the wrapped function, resolving and caching its annotation
    /// arguments on first use.
    pub fn call(&self, extra: CallArgs) -> Result<Value, InjectError> {
        let resolved = self.resolve_args()?;
        let mut args = resolved.args;
        args.extend(self.bound.args.iter().cloned());
        args.extend(extra.args);
        let mut kwargs = resolved.kwargs;
        kwargs.extend(self.bound.kwargs.clone());
        kwargs.extend(extra.kwargs);
        (self.func)(CallArgs { args, kwargs })
    }

    fn resolve_args(&self) -> Result<CallArgs, InjectError> {
        let mut cache = lock(&self.resolved);
        if let Some(resolved) = cache.as_ref() {
            return Ok(resolved.clone());
        }
        let annotation = get_annotation(&self.func)?;
        let resolved = self.injector.resolve_annotation(&annotation, true)?;
        *cache = Some(resolved.clone());
        Ok(resolved)
    }
}

fn downcast_partial(v: Value) -> Result<Arc<PartialFn>, InjectError> {
    v.downcast::<PartialFn>()
        .map_err(|_| InjectError::TypeMismatch {
            expected: "PartialFn",
        })
}

// Poisoning only means a previous callback panicked mid-update; resolution
// state stays usable, so recover the guard instead of panicking.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
