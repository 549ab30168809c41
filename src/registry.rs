use std::collections::HashMap;
use std::sync::Arc;

use crate::{CallArgs, InjectError, Note, Provider, RoutineFactory, Value, value};

/// Produces a value directly. Receives the arguments resolved for the
/// factory's own annotation (empty when unannotated) and the request's
/// qualifier.
pub type Factory =
    Arc<dyn Fn(CallArgs, Option<&str>) -> Result<Value, InjectError> + Send + Sync>;

/// Constructs a [`Provider`] instance. Receives the arguments resolved for
/// the constructor's own annotation.
pub type Constructor =
    Arc<dyn Fn(CallArgs) -> Result<Box<dyn Provider>, InjectError> + Send + Sync>;

/// What a namespace knows about one base note.
pub enum ProviderEntry {
    /// A constant, memoized like any other unqualified value.
    Value(Value),
    /// A plain value-producing function; no instance is kept, nothing is
    /// closed.
    Factory(Factory),
    /// A constructible provider type; the instance built from it is kept
    /// and closed on injector close.
    ProviderType(Constructor),
    /// A two-phase setup routine, wrapped in a
    /// [`RoutineProvider`](crate::RoutineProvider) at resolution time.
    Routine {
        factory: RoutineFactory,
        qualifier_aware: bool,
    },
}

/// A registration scope: a provider table of its own plus an explicit,
/// precedence-ordered chain of ancestor namespaces.
///
/// The chain is linearized once at construction (each parent followed by
/// that parent's own chain, first occurrence wins), so lookup is a plain
/// nearest-first walk with no recursion. Registration only ever touches the
/// namespace's own table: a child re-registering a note shadows the
/// ancestor's entry for itself and its descendants without erasing it, so
/// sibling namespaces keep seeing the original.
pub struct Namespace {
    name: String,
    table: HashMap<String, ProviderEntry>,
    chain: Vec<Arc<Namespace>>,
}

impl Namespace {
    /// Creates a root namespace with no ancestors.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parents(name, Vec::new())
    }

    /// Creates a namespace inheriting from `parents`, nearest-first.
    pub fn with_parents(name: impl Into<String>, parents: Vec<Arc<Namespace>>) -> Self {
        let mut chain: Vec<Arc<Namespace>> = Vec::new();
        let mut push_unique = |chain: &mut Vec<Arc<Namespace>>, ns: &Arc<Namespace>| {
            if !chain.iter().any(|seen| Arc::ptr_eq(seen, ns)) {
                chain.push(ns.clone());
            }
        };
        for parent in &parents {
            push_unique(&mut chain, parent);
            for ancestor in &parent.chain {
                push_unique(&mut chain, ancestor);
            }
        }
        Self {
            name: name.into(),
            table: HashMap::new(),
            chain,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a constant under the note's base.
    pub fn register_value<T>(&mut self, note: impl Into<Note>, v: T) -> Result<(), InjectError>
    where
        T: Send + Sync + 'static,
    {
        self.register(note, ProviderEntry::Value(value(v)))
    }

    /// Registers a plain factory function under the note's base.
    pub fn register_factory(
        &mut self,
        note: impl Into<Note>,
        factory: Factory,
    ) -> Result<(), InjectError> {
        self.register(note, ProviderEntry::Factory(factory))
    }

    /// Registers a constructible provider type under the note's base.
    pub fn register_provider_type(
        &mut self,
        note: impl Into<Note>,
        constructor: Constructor,
    ) -> Result<(), InjectError> {
        self.register(note, ProviderEntry::ProviderType(constructor))
    }

    /// Registers a two-phase setup routine under the note's base.
    /// `qualifier_aware` marks whether the routine answers qualified
    /// lookups after its first yield.
    pub fn register_routine(
        &mut self,
        note: impl Into<Note>,
        qualifier_aware: bool,
        factory: RoutineFactory,
    ) -> Result<(), InjectError> {
        self.register(
            note,
            ProviderEntry::Routine {
                factory,
                qualifier_aware,
            },
        )
    }

    fn register(&mut self, note: impl Into<Note>, entry: ProviderEntry) -> Result<(), InjectError> {
        let note = note.into();
        let base = note
            .base()
            .ok_or_else(|| InjectError::InvalidNote(note.to_string()))?;
        tracing::debug!(namespace = %self.name, note = %base, "Registering provider");
        self.table.insert(base.to_string(), entry);
        Ok(())
    }

    /// Finds the provider entry for `base`, walking this namespace and then
    /// its ancestor chain in precedence order.
    pub fn lookup(&self, base: &str) -> Option<&ProviderEntry> {
        if let Some(entry) = self.table.get(base) {
            return Some(entry);
        }
        self.chain.iter().find_map(|ns| ns.table.get(base))
    }

    /// Whether `base` is registered in this namespace's own table, ignoring
    /// ancestors.
    pub fn registers(&self, base: &str) -> bool {
        self.table.contains_key(base)
    }
}

/// Wraps a closure over `(resolved_args, qualifier)` as a [`Factory`].
pub fn factory<F>(f: F) -> Factory
where
    F: Fn(CallArgs, Option<&str>) -> Result<Value, InjectError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps a provider-type constructor closure as a [`Constructor`].
pub fn constructor<F, P>(f: F) -> Constructor
where
    F: Fn(CallArgs) -> Result<P, InjectError> + Send + Sync + 'static,
    P: Provider + 'static,
{
    Arc::new(move |args| Ok(Box::new(f(args)?) as Box<dyn Provider>))
}

/// Wraps a routine-building closure as a [`RoutineFactory`].
pub fn routine_factory<F>(f: F) -> RoutineFactory
where
    F: Fn(CallArgs) -> Result<crate::Routine, InjectError> + Send + Sync + 'static,
{
    Arc::new(f)
}
