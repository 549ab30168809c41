use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::{InjectError, Note};

/// The dependency declaration attached to a consumer function: an ordered
/// sequence of positional notes plus a keyword-name to note mapping.
#[derive(Clone, Default)]
pub struct Annotation {
    pub(crate) notes: Vec<Note>,
    pub(crate) keyword_notes: BTreeMap<String, Note>,
}

impl Annotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional note.
    pub fn note(mut self, note: impl Into<Note>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Declares a keyword note for the argument `name`.
    pub fn keyword(mut self, name: impl Into<String>, note: impl Into<Note>) -> Self {
        self.keyword_notes.insert(name.into(), note.into());
        self
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn keyword_notes(&self) -> &BTreeMap<String, Note> {
        &self.keyword_notes
    }
}

/// Stable identity of an annotated callable: the `Arc` data pointer, shared
/// by every clone of the handle. The store pins the allocation for as long
/// as the entry lives, so an id is never reused while registered.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct CallableId(usize);

impl CallableId {
    pub fn of<T: ?Sized>(callable: &Arc<T>) -> Self {
        Self(Arc::as_ptr(callable) as *const () as usize)
    }
}

struct AnnotationEntry {
    annotation: Annotation,
    // Keeps the annotated callable's allocation alive.
    _pin: Box<dyn Any + Send + Sync>,
}

/// Identity-keyed registry of annotations.
///
/// Annotating never wraps or alters the callable; the callable stays
/// directly invocable and a clone of its `Arc` resolves to the same entry.
/// A callable accepts at most one annotation for its lifetime.
#[derive(Default)]
pub struct AnnotationStore {
    entries: DashMap<CallableId, AnnotationEntry>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `annotation` to `callable`. Fails with
    /// [`InjectError::AlreadyAnnotated`] on re-annotation.
    pub fn annotate<T>(&self, callable: &Arc<T>, annotation: Annotation) -> Result<(), InjectError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.entries.entry(CallableId::of(callable)) {
            Entry::Occupied(_) => Err(InjectError::AlreadyAnnotated),
            Entry::Vacant(v) => {
                v.insert(AnnotationEntry {
                    annotation,
                    _pin: Box::new(callable.clone()),
                });
                Ok(())
            }
        }
    }

    /// Reads back the annotation attached to `callable`. Fails with
    /// [`InjectError::NotAnnotated`] when absent.
    pub fn get<T>(&self, callable: &Arc<T>) -> Result<Annotation, InjectError>
    where
        T: ?Sized,
    {
        self.entries
            .get(&CallableId::of(callable))
            .map(|entry| entry.annotation.clone())
            .ok_or(InjectError::NotAnnotated)
    }

    /// Whether `callable` carries an annotation. Never fails.
    pub fn has<T>(&self, callable: &Arc<T>) -> bool
    where
        T: ?Sized,
    {
        self.entries.contains_key(&CallableId::of(callable))
    }
}

static STORE: LazyLock<AnnotationStore> = LazyLock::new(AnnotationStore::new);

/// Attaches an annotation to `callable` in the global store.
pub fn annotate<T>(callable: &Arc<T>, annotation: Annotation) -> Result<(), InjectError>
where
    T: ?Sized + Send + Sync + 'static,
{
    STORE.annotate(callable, annotation)
}

/// Reads `callable`'s annotation from the global store.
pub fn get_annotation<T>(callable: &Arc<T>) -> Result<Annotation, InjectError>
where
    T: ?Sized,
{
    STORE.get(callable)
}

/// Whether `callable` is annotated in the global store.
pub fn has_annotation<T>(callable: &Arc<T>) -> bool
where
    T: ?Sized,
{
    STORE.has(callable)
}
