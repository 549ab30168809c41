use std::sync::Arc;

use crate::{CallArgs, InjectError, Value};

/// A live source of values for one base note.
///
/// Providers answer `get(qualifier)` while open and are torn down exactly
/// once via `close()`. The injector constructs at most one provider per base
/// note and closes them in reverse construction order.
pub trait Provider: Send {
    /// Produces the value for this note, or a qualifier-specific derived
    /// value when `qualifier` is given.
    fn get(&mut self, qualifier: Option<&str>) -> Result<Value, InjectError>;

    /// Releases any resources held by the provider.
    fn close(&mut self) -> Result<(), InjectError> {
        Ok(())
    }
}

/// Input handed to a two-phase setup routine on each resume.
pub enum Resume<'a> {
    /// First resume: perform setup and yield the initial value.
    Start,
    /// A qualified lookup; only sent to qualifier-aware routines.
    Qualifier(&'a str),
    /// Cancellation signal; terminating resume for qualifier-aware routines.
    Cancel,
    /// Final resume for plain routines: perform teardown and finish.
    Finish,
}

/// What a routine did in response to a resume.
pub enum Step {
    /// The routine suspended, handing back a value.
    Yielded(Value),
    /// The routine ran to completion.
    Finished,
}

/// A cooperative setup/teardown routine, driven by [`RoutineProvider`].
///
/// The closure plays the role of a suspendable routine: it holds its own
/// state between resumes and reports each hand-off as a [`Step`].
pub type Routine = Box<dyn FnMut(Resume<'_>) -> Result<Step, InjectError> + Send>;

/// Builds a [`Routine`] from the arguments resolved for its declared notes.
pub type RoutineFactory = Arc<dyn Fn(CallArgs) -> Result<Routine, InjectError> + Send + Sync>;

enum Phase {
    Uninitialized,
    Ready { routine: Routine, initial: Value },
    Closed,
}

/// Adapts a two-phase setup routine to the uniform [`Provider`] contract.
///
/// The adapter is an explicit three-state machine: created uninitialized,
/// moved to ready by [`init`](RoutineProvider::init) (which requires the
/// routine to yield at least once), and closed exactly once. Unqualified
/// `get`s answer from the value captured at init; qualified `get`s resume
/// the routine, which must yield again.
pub struct RoutineProvider {
    factory: RoutineFactory,
    qualifier_aware: bool,
    phase: Phase,
}

impl RoutineProvider {
    pub fn new(factory: RoutineFactory, qualifier_aware: bool) -> Self {
        Self {
            factory,
            qualifier_aware,
            phase: Phase::Uninitialized,
        }
    }

    /// Invokes the routine with `args` and drives it to its first suspension
    /// point, returning the initial value.
    pub fn init(&mut self, args: CallArgs) -> Result<Value, InjectError> {
        if !matches!(self.phase, Phase::Uninitialized) {
            return Err(InjectError::Lifecycle("already initialized"));
        }
        let mut routine = (self.factory)(args)?;
        match routine(Resume::Start)? {
            Step::Yielded(initial) => {
                self.phase = Phase::Ready {
                    routine,
                    initial: initial.clone(),
                };
                Ok(initial)
            }
            Step::Finished => {
                self.phase = Phase::Closed;
                tracing::warn!("Routine ran to completion during init");
                Err(InjectError::Lifecycle("did not yield"))
            }
        }
    }
}

impl Provider for RoutineProvider {
    fn get(&mut self, qualifier: Option<&str>) -> Result<Value, InjectError> {
        let Phase::Ready { routine, initial } = &mut self.phase else {
            return Err(InjectError::Lifecycle("not initialized"));
        };
        let qualifier = match qualifier {
            None => return Ok(initial.clone()),
            Some(q) => q,
        };
        if !self.qualifier_aware {
            return Err(InjectError::UnsupportedQualifiedLookup(
                qualifier.to_string(),
            ));
        }
        match routine(Resume::Qualifier(qualifier))? {
            Step::Yielded(v) => Ok(v),
            Step::Finished => {
                self.phase = Phase::Closed;
                tracing::warn!(qualifier, "Routine stopped instead of yielding");
                Err(InjectError::Lifecycle("did not yield"))
            }
        }
    }

    fn close(&mut self) -> Result<(), InjectError> {
        let Phase::Ready { routine, .. } = &mut self.phase else {
            return Err(match self.phase {
                Phase::Closed => InjectError::Lifecycle("already closed"),
                _ => InjectError::Lifecycle("not initialized"),
            });
        };
        // Qualifier-aware routines loop on lookups, so their terminating
        // resume is the cancellation signal; plain routines just run their
        // teardown tail.
        let resume = if self.qualifier_aware {
            Resume::Cancel
        } else {
            Resume::Finish
        };
        let step = routine(resume);
        self.phase = Phase::Closed;
        match step? {
            Step::Finished => Ok(()),
            Step::Yielded(_) => {
                tracing::warn!("Routine yielded instead of stopping");
                Err(InjectError::Lifecycle("did not stop"))
            }
        }
    }
}
