//! Ordered lists of fallible teardown callbacks.

use crate::error::BoxError;

/// A fallible teardown callback. Runs at most once.
pub(crate) type Hook = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// Append-only hook list, drained once in reverse-registration order.
///
/// After the drain the list is frozen: late registrations are dropped
/// rather than kept for a phase that will never run again.
pub(crate) struct HookList {
    hooks: Vec<Hook>,
    ran: bool,
}

impl HookList {
    pub(crate) fn new() -> Self {
        Self {
            hooks: Vec::new(),
            ran: false,
        }
    }

    /// Append a hook, unless the phase already ran.
    pub(crate) fn push(&mut self, hook: Hook) {
        if self.ran {
            log::debug!("hook registered after its phase ran, dropping");
            return;
        }
        self.hooks.push(hook);
    }

    /// Take the hooks for execution, freezing the list.
    pub(crate) fn take(&mut self) -> Vec<Hook> {
        self.ran = true;
        std::mem::take(&mut self.hooks)
    }
}

/// Run drained hooks last-registered-first, collecting every error.
///
/// A failing hook never short-circuits the rest.
pub(crate) fn run_hooks(hooks: Vec<Hook>, errors: &mut Vec<BoxError>) {
    for hook in hooks.into_iter().rev() {
        if let Err(e) = hook() {
            errors.push(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_in_reverse_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut list = HookList::new();
        for id in [1, 2, 3] {
            let order = order.clone();
            list.push(Box::new(move || {
                order.lock().unwrap().push(id);
                Ok(())
            }));
        }

        let mut errors = Vec::new();
        run_hooks(list.take(), &mut errors);

        assert_eq!(*order.lock().unwrap(), vec![3, 2, 1]);
        assert!(errors.is_empty());
    }

    #[test]
    fn collects_errors_without_short_circuit() {
        let mut list = HookList::new();
        list.push(Box::new(|| Ok(())));
        list.push(Box::new(|| Err("first".into())));
        list.push(Box::new(|| Err("second".into())));

        let mut errors = Vec::new();
        run_hooks(list.take(), &mut errors);

        // LIFO: "second" registered last, so it fails first.
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].to_string(), "second");
        assert_eq!(errors[1].to_string(), "first");
    }

    #[test]
    fn push_after_take_is_dropped() {
        let mut list = HookList::new();
        let _ = list.take();
        list.push(Box::new(|| Err("late".into())));

        let mut errors = Vec::new();
        run_hooks(list.take(), &mut errors);
        assert!(errors.is_empty());
    }
}
