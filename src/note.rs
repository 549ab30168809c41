use std::fmt;

use crate::{CallArgs, Callable};

/// A token naming a single dependency request.
///
/// The string form is `"object"` or `"object:qualifier"`; the structured
/// forms are the directives built by [`maybe`], [`partial`] and
/// [`eager_partial`]. Strings parse infallibly: the base is everything
/// before the first `:`, the qualifier everything after it (absent or empty
/// means no qualifier, and the qualifier carries no further structure).
#[derive(Clone)]
pub enum Note {
    /// A plain request for a base note, optionally qualified.
    Plain {
        base: String,
        qualifier: Option<String>,
    },
    /// Optional resolution: as a keyword note, an unresolvable result drops
    /// the keyword from the call instead of failing it.
    Maybe(Box<Note>),
    /// Deferred application: resolves to a wrapper that resolves its
    /// function's annotation on first invocation.
    Partial(PartialDirective),
    /// Deferred application resolved immediately at injector `get` time.
    EagerPartial(PartialDirective),
}

/// Payload of a deferred-call directive: the function to apply plus the
/// arguments bound at directive-construction time.
#[derive(Clone)]
pub struct PartialDirective {
    pub(crate) func: Callable,
    pub(crate) bound: CallArgs,
}

impl Note {
    /// Parses the string note grammar.
    pub fn parse(token: &str) -> Note {
        let (base, qualifier) = match token.split_once(':') {
            Some((base, qualifier)) if !qualifier.is_empty() => {
                (base, Some(qualifier.to_string()))
            }
            Some((base, _)) => (base, None),
            None => (token, None),
        };
        Note::Plain {
            base: base.to_string(),
            qualifier,
        }
    }

    /// The base identifier, when this is a plain note (unwrapping `maybe`).
    pub fn base(&self) -> Option<&str> {
        match self {
            Note::Plain { base, .. } => Some(base),
            Note::Maybe(inner) => inner.base(),
            _ => None,
        }
    }

    /// The qualifier, when this is a plain note carrying one.
    pub fn qualifier(&self) -> Option<&str> {
        match self {
            Note::Plain { qualifier, .. } => qualifier.as_deref(),
            Note::Maybe(inner) => inner.qualifier(),
            _ => None,
        }
    }

    /// Whether this note is a deferred-call directive.
    pub fn is_directive(&self) -> bool {
        matches!(self, Note::Partial(_) | Note::EagerPartial(_))
    }
}

impl From<&str> for Note {
    fn from(token: &str) -> Self {
        Note::parse(token)
    }
}

impl From<String> for Note {
    fn from(token: String) -> Self {
        Note::parse(&token)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Note::Plain {
                base,
                qualifier: Some(q),
            } => write!(f, "{base}:{q}"),
            Note::Plain { base, .. } => write!(f, "{base}"),
            Note::Maybe(inner) => write!(f, "maybe({inner})"),
            Note::Partial(_) => write!(f, "<partial>"),
            Note::EagerPartial(_) => write!(f, "<eager partial>"),
        }
    }
}

impl fmt::Debug for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Note({self})")
    }
}

/// Wraps a note for optional resolution. Only meaningful for keyword notes;
/// an unresolvable `maybe` keyword is omitted from the call rather than
/// failing it.
pub fn maybe(note: impl Into<Note>) -> Note {
    Note::Maybe(Box::new(note.into()))
}

/// Builds a deferred-call directive around `func` with arguments bound now.
/// Resolution of the directive yields a wrapper that resolves `func`'s
/// annotation on its first invocation.
pub fn partial(func: Callable, bound: CallArgs) -> Note {
    Note::Partial(PartialDirective { func, bound })
}

/// Like [`partial`], but the annotation is resolved immediately when the
/// directive itself is resolved.
pub fn eager_partial(func: Callable, bound: CallArgs) -> Note {
    Note::EagerPartial(PartialDirective { func, bound })
}
