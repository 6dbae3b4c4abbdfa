//! Completion events and tokens.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

struct EventState {
    fired: bool,
    callbacks: Vec<Box<dyn FnOnce() + Send>>,
}

pub(crate) struct Event {
    state: Mutex<EventState>,
    cond: Condvar,
}

impl Event {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EventState {
                fired: false,
                callbacks: Vec::new(),
            }),
            cond: Condvar::new(),
        })
    }

    /// Mark complete, wake waiters, run registered callbacks.
    ///
    /// Callbacks run on the firing thread, outside the lock. They only
    /// ever decrement dependency counters and push ready jobs, so they
    /// never re-enter a blocking wait.
    pub(crate) fn fire(&self) {
        let callbacks = {
            let mut state = self.state.lock();
            if state.fired {
                return;
            }
            state.fired = true;
            std::mem::take(&mut state.callbacks)
        };
        self.cond.notify_all();
        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn wait(&self) {
        let mut state = self.state.lock();
        while !state.fired {
            self.cond.wait(&mut state);
        }
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.state.lock().fired
    }

    /// Run `callback` once this event fires; immediately if it already has.
    ///
    /// Registration and firing race benignly: the lock decides which side
    /// runs the callback, and exactly one side does.
    pub(crate) fn on_fire(&self, callback: Box<dyn FnOnce() + Send>) {
        let mut state = self.state.lock();
        if state.fired {
            drop(state);
            callback();
        } else {
            state.callbacks.push(callback);
        }
    }
}

/// Completion token returned from a submission.
///
/// Tokens are cheap clones of a shared event. Passing one to a later
/// `submit` declares an explicit dependency; calling [`Token::wait`]
/// blocks the host thread until the submission completes.
#[derive(Clone)]
pub struct Token {
    event: Arc<Event>,
}

impl Token {
    pub(crate) fn new(event: Arc<Event>) -> Self {
        Self { event }
    }

    pub(crate) fn event(&self) -> &Arc<Event> {
        &self.event
    }

    /// Block the calling host thread until the submission completes.
    pub fn wait(&self) {
        self.event.wait();
    }

    pub fn is_complete(&self) -> bool {
        self.event.is_fired()
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fire_wakes_waiters() {
        let event = Event::new();
        let token = Token::new(event.clone());

        let handle = {
            let token = token.clone();
            std::thread::spawn(move || token.wait())
        };

        event.fire();
        handle.join().unwrap();
        assert!(token.is_complete());
    }

    #[test]
    fn callback_after_fire_runs_inline() {
        let event = Event::new();
        event.fire();

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        event.on_fire(Box::new(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fire_is_idempotent() {
        let event = Event::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        event.on_fire(Box::new(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        }));

        event.fire();
        event.fire();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
