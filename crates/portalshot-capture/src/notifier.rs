//! Callback registration with explicit cancellation.
//!
//! A [`Notifier`] fans an event out to its listeners. Registering returns a
//! [`Subscription`]; dropping (or cancelling) it removes the listener, so a
//! component that owns its subscriptions can never leave a dangling callback
//! behind.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    listeners: Vec<(u64, Listener<E>)>,
}

fn lock<E>(m: &Mutex<Registry<E>>) -> MutexGuard<'_, Registry<E>> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Notifier ─────────────────────────────────────────────────────────────────

pub struct Notifier<E> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for Notifier<E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: 'static> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Notifier<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry { next_id: 0, listeners: Vec::new() })),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut reg = lock(&self.inner);
            let id = reg.next_id;
            reg.next_id += 1;
            reg.listeners.push((id, Arc::new(listener)));
            id
        };
        let registry: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                lock(&registry).listeners.retain(|(other, _)| *other != id);
            }
        })
    }

    /// Forwards every event into an unbounded channel for as long as the
    /// returned subscription lives.
    pub fn channel(&self) -> (Subscription, mpsc::UnboundedReceiver<E>)
    where
        E: Clone + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        (sub, rx)
    }

    /// Calls every listener registered at the time of the call. Listeners run
    /// outside the registry lock and may subscribe or cancel freely.
    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> =
            lock(&self.inner).listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }
}

// ── Subscription ─────────────────────────────────────────────────────────────

/// Handle of one registered listener. Removes it on drop.
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}
