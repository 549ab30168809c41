/// Type alias for boxed errors that can be sent across threads.
///
/// Provider implementations use this to surface arbitrary failures through
/// [`InjectError::Provider`] without the engine knowing their concrete type.
pub type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the resolution and lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    /// No provider is registered for the note's base anywhere in the
    /// namespace chain.
    #[error("no provider for note `{0}`")]
    Unresolvable(String),
    /// A provider recognizes the note but cannot supply a value right now,
    /// e.g. a missing configuration key. Carries the originating note once
    /// the injector has enriched it.
    #[error("provider cannot currently supply `{note}`")]
    CurrentlyUnavailable { note: String },
    /// A two-phase provider violated its contract: did not yield on init,
    /// did not stop on close, or was driven out of order.
    #[error("provider lifecycle violation: {0}")]
    Lifecycle(&'static str),
    /// A qualified lookup was requested from a provider that only answers
    /// unqualified requests.
    #[error("provider does not support qualified lookup `{0}`")]
    UnsupportedQualifiedLookup(String),
    /// The callable already carries an annotation.
    #[error("callable is already annotated")]
    AlreadyAnnotated,
    /// The callable carries no annotation.
    #[error("callable is not annotated")]
    NotAnnotated,
    /// A structured note was used where it cannot mean anything, e.g.
    /// `maybe` around a directive or a directive as a registration key.
    #[error("invalid note: {0}")]
    InvalidNote(String),
    /// Any resolution or close attempted after the injector was closed.
    #[error("injector is closed")]
    InjectorClosed,
    /// A resolved value did not hold the type the caller asked for.
    #[error("value does not hold a `{expected}`")]
    TypeMismatch { expected: &'static str },
    /// A provider or consumer failed with an error of its own.
    #[error("provider failed")]
    Provider(#[source] StdError),
}

impl InjectError {
    /// Whether this error means the note could not be resolved, covering
    /// both the missing-provider and currently-unavailable cases. This is
    /// the predicate behind `maybe`-keyword dropping.
    pub fn is_unresolvable(&self) -> bool {
        matches!(
            self,
            InjectError::Unresolvable(_) | InjectError::CurrentlyUnavailable { .. }
        )
    }
}

impl From<StdError> for InjectError {
    fn from(value: StdError) -> Self {
        Self::Provider(value)
    }
}

/// Signals that a provider recognizes the note but has no value for it
/// right now. The injector fills in the originating note before the error
/// reaches the caller.
pub fn unavailable() -> InjectError {
    InjectError::CurrentlyUnavailable {
        note: String::new(),
    }
}
