//! Aggregated errors from a close pass.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Boxed error currency for hooks and tracked tasks.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// The combined outcome of one close pass.
///
/// Holds every error raised during the pass, in order: the injected cause
/// first (if any), then closing-phase hook errors, then closed-phase hook
/// errors, each phase in execution order. Clones share the same underlying
/// list, so every [`close`](crate::Closer::close) caller receives the same
/// aggregate.
#[derive(Debug, Clone)]
pub struct CloseError {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    errors: Vec<BoxError>,
    has_cause: bool,
}

impl CloseError {
    /// Build the aggregate, or `None` when nothing went wrong.
    pub(crate) fn from_parts(cause: Option<BoxError>, hook_errors: Vec<BoxError>) -> Option<Self> {
        if cause.is_none() && hook_errors.is_empty() {
            return None;
        }
        let has_cause = cause.is_some();
        let mut errors = Vec::with_capacity(hook_errors.len() + usize::from(has_cause));
        errors.extend(cause);
        errors.extend(hook_errors);
        Some(Self {
            shared: Arc::new(Shared { errors, has_cause }),
        })
    }

    /// The caller-injected cause, when the close was started through
    /// [`close_with_error`](crate::Closer::close_with_error) or a failed
    /// tracked task.
    ///
    /// Always the first entry of [`errors`](CloseError::errors), so callers
    /// holding the injected value can match it with `downcast_ref`.
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        if self.shared.has_cause {
            self.shared.errors.first().map(|e| e.as_ref())
        } else {
            None
        }
    }

    /// All collected errors, in order. Never empty.
    pub fn errors(&self) -> &[BoxError] {
        &self.shared.errors
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.shared.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl Error for CloseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.shared
            .errors
            .first()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}
