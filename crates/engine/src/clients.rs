// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Consumer registry and round-robin selection.
//!
//! # Structure
//!
//! `ClientRegistry` maps a queue name to a `ClientList`. The map uses the same
//! read-lock fast path / write-lock `entry` slow path as the exchange.
//!
//! Each `ClientList` keeps its consumers and its round-robin cursor under one
//! mutex, so a selection always indexes the same list it counted. Consumers
//! are kept in registration order; a reconnect with a known session id
//! replaces the handle in place.
//!
//! # Round robin
//!
//! The cursor is re-normalized as `cursor % count` on every selection and
//! advanced past the selected consumer, whatever the later delivery outcome.
//! With a stable set of N consumers, N selections visit each exactly once in
//! registration order. Under churn the order is best-effort: removing a
//! consumer shifts the ones after it. With no consumers the cursor resets to
//! 0 so the next attach starts at the first consumer.
//!
//! # Disconnects
//!
//! Registering a consumer installs a closed hook on its channel that removes
//! the registration. Each registration carries an id; the hook only removes
//! the registration it was installed for, so a stale hook from a replaced
//! connection cannot evict the reconnected one. The hook holds a weak
//! reference and is a no-op once the list is gone.

use crate::channel::{ConsumerChannel, SessionId};
use memorymq_config::QueueName;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Registry of consumers attached to each queue name.
#[derive(Default)]
pub struct ClientRegistry {
    lists: RwLock<HashMap<QueueName, Arc<ClientList>>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `consumer` to `queue_name`.
    ///
    /// A consumer with the same session id replaces the previous one. The
    /// consumer is removed automatically when its channel closes.
    pub fn add_consumer(&self, queue_name: &QueueName, consumer: Arc<dyn ConsumerChannel>) {
        self.list(queue_name).add(consumer);
    }

    /// Detaches the consumer with `session_id` from `queue_name`.
    ///
    /// Returns whether a consumer was removed; removing an absent session is a
    /// no-op.
    pub fn remove_consumer(&self, queue_name: &QueueName, session_id: &SessionId) -> bool {
        self.existing(queue_name)
            .is_some_and(|list| list.remove(session_id))
    }

    /// Selects the next consumer of `queue_name` in round-robin order and
    /// advances the cursor.
    #[must_use]
    pub fn try_get_consumer(&self, queue_name: &QueueName) -> Option<Arc<dyn ConsumerChannel>> {
        self.existing(queue_name)?.select()
    }

    /// Number of consumers attached to `queue_name`.
    #[must_use]
    pub fn consumer_count(&self, queue_name: &QueueName) -> usize {
        self.existing(queue_name).map_or(0, |list| list.len())
    }

    fn existing(&self, queue_name: &QueueName) -> Option<Arc<ClientList>> {
        self.lists.read().get(queue_name).map(Arc::clone)
    }

    fn list(&self, queue_name: &QueueName) -> Arc<ClientList> {
        if let Some(list) = self.existing(queue_name) {
            return list;
        }
        let mut lists = self.lists.write();
        Arc::clone(
            lists
                .entry(queue_name.clone())
                .or_insert_with(|| Arc::new(ClientList::new(queue_name.clone()))),
        )
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("queues", &self.lists.read().len())
            .finish()
    }
}

struct Registration {
    id: u64,
    consumer: Arc<dyn ConsumerChannel>,
}

struct ClientListState {
    consumers: Vec<Registration>,
    cursor: usize,
    next_registration: u64,
}

/// Consumers of one queue name plus its round-robin cursor.
struct ClientList {
    queue_name: QueueName,
    state: Mutex<ClientListState>,
}

impl ClientList {
    fn new(queue_name: QueueName) -> Self {
        Self {
            queue_name,
            state: Mutex::new(ClientListState {
                consumers: Vec::new(),
                cursor: 0,
                next_registration: 1,
            }),
        }
    }

    fn add(self: &Arc<Self>, consumer: Arc<dyn ConsumerChannel>) {
        let session_id = consumer.session_id().clone();
        debug!(queue = %self.queue_name, session_id = %session_id, "adding consumer");

        let id = {
            let mut state = self.state.lock();
            let id = state.next_registration;
            state.next_registration += 1;
            let registration = Registration {
                id,
                consumer: Arc::clone(&consumer),
            };
            match state
                .consumers
                .iter_mut()
                .find(|existing| existing.consumer.session_id() == &session_id)
            {
                Some(existing) => *existing = registration,
                None => state.consumers.push(registration),
            }
            id
        };

        // Installed outside the lock: an already closed channel runs the hook
        // right away.
        let list: Weak<Self> = Arc::downgrade(self);
        consumer.on_closed(Box::new(move || {
            if let Some(list) = list.upgrade() {
                debug!(queue = %list.queue_name, session_id = %session_id, "detaching consumer");
                _ = list.remove_registration(&session_id, id);
            }
        }));
    }

    fn remove(&self, session_id: &SessionId) -> bool {
        let mut state = self.state.lock();
        let before = state.consumers.len();
        state
            .consumers
            .retain(|registration| registration.consumer.session_id() != session_id);
        let removed = state.consumers.len() != before;
        if removed {
            debug!(queue = %self.queue_name, session_id = %session_id, "removed consumer");
        }
        removed
    }

    fn remove_registration(&self, session_id: &SessionId, id: u64) -> bool {
        let mut state = self.state.lock();
        let before = state.consumers.len();
        state.consumers.retain(|registration| {
            registration.id != id || registration.consumer.session_id() != session_id
        });
        state.consumers.len() != before
    }

    fn select(&self) -> Option<Arc<dyn ConsumerChannel>> {
        let mut state = self.state.lock();
        let count = state.consumers.len();
        if count == 0 {
            state.cursor = 0;
            return None;
        }
        let index = state.cursor % count;
        state.cursor = index + 1;
        Some(Arc::clone(&state.consumers[index].consumer))
    }

    fn len(&self) -> usize {
        self.state.lock().consumers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::local_consumer;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn queue(raw: &str) -> QueueName {
        QueueName::parse(raw).expect("valid queue name")
    }

    fn selected(registry: &ClientRegistry, queue_name: &QueueName) -> Option<String> {
        registry
            .try_get_consumer(queue_name)
            .map(|consumer| consumer.session_id().to_string())
    }

    #[test]
    fn stable_consumers_are_visited_once_per_cycle() {
        let registry = ClientRegistry::new();
        let q = queue("q");
        let mut receivers = Vec::new();
        for name in ["s1", "s2", "s3"] {
            let (consumer, receiver) = local_consumer(name);
            registry.add_consumer(&q, consumer);
            receivers.push(receiver);
        }

        let cycle: Vec<_> = (0..6).filter_map(|_| selected(&registry, &q)).collect();
        assert_eq!(cycle, ["s1", "s2", "s3", "s1", "s2", "s3"]);
    }

    #[test]
    fn removal_is_idempotent() {
        let registry = ClientRegistry::new();
        let q = queue("q");
        let (consumer, _receiver) = local_consumer("s1");
        registry.add_consumer(&q, consumer);

        assert!(registry.remove_consumer(&q, &SessionId::from("s1")));
        assert!(!registry.remove_consumer(&q, &SessionId::from("s1")));
        assert!(!registry.remove_consumer(&q, &SessionId::from("never")));
        assert!(!registry.remove_consumer(&queue("other"), &SessionId::from("s1")));
        assert_eq!(registry.consumer_count(&q), 0);
    }

    #[test]
    fn empty_list_resets_cursor_and_recovers_on_attach() {
        let registry = ClientRegistry::new();
        let q = queue("q");
        let (s1, _r1) = local_consumer("s1");
        let (s2, _r2) = local_consumer("s2");
        registry.add_consumer(&q, s1);
        registry.add_consumer(&q, s2);
        assert_eq!(selected(&registry, &q).as_deref(), Some("s1"));

        _ = registry.remove_consumer(&q, &SessionId::from("s1"));
        _ = registry.remove_consumer(&q, &SessionId::from("s2"));
        assert_eq!(selected(&registry, &q), None);

        let (s3, _r3) = local_consumer("s3");
        let (s4, _r4) = local_consumer("s4");
        registry.add_consumer(&q, s3);
        registry.add_consumer(&q, s4);
        assert_eq!(selected(&registry, &q).as_deref(), Some("s3"));
    }

    #[test]
    fn closing_a_channel_detaches_the_consumer() {
        let registry = ClientRegistry::new();
        let q = queue("q");
        let (s1, r1) = local_consumer("s1");
        let (s2, _r2) = local_consumer("s2");
        registry.add_consumer(&q, s1);
        registry.add_consumer(&q, s2);

        drop(r1);
        assert_eq!(registry.consumer_count(&q), 1);
        for _ in 0..3 {
            assert_eq!(selected(&registry, &q).as_deref(), Some("s2"));
        }
    }

    #[test]
    fn stale_close_hook_does_not_evict_reconnected_session() {
        let registry = ClientRegistry::new();
        let q = queue("q");
        let (old, old_receiver) = local_consumer("s1");
        let (new, _new_receiver) = local_consumer("s1");
        registry.add_consumer(&q, old);
        registry.add_consumer(&q, new);
        assert_eq!(registry.consumer_count(&q), 1);

        drop(old_receiver);
        assert_eq!(registry.consumer_count(&q), 1);
        assert_eq!(selected(&registry, &q).as_deref(), Some("s1"));
    }

    #[test]
    fn already_closed_channel_is_never_selectable() {
        let registry = ClientRegistry::new();
        let q = queue("q");
        let (consumer, receiver) = local_consumer("s1");
        receiver.close();
        registry.add_consumer(&q, consumer);
        assert_eq!(registry.consumer_count(&q), 0);
        assert_eq!(selected(&registry, &q), None);
    }

    #[test]
    fn unknown_queue_has_no_consumer() {
        let registry = ClientRegistry::new();
        assert!(registry.try_get_consumer(&queue("nobody")).is_none());
        assert_eq!(registry.consumer_count(&queue("nobody")), 0);
    }

    // Selection racing with attach, detach and channel close never indexes
    // past the list it counted and only returns sessions that were registered.
    #[test]
    fn concurrent_churn_keeps_selection_consistent() {
        let registry = Arc::new(ClientRegistry::new());
        let q = queue("q");
        let churners = 2;
        let sessions_per_churner = 4;
        let known: HashSet<String> = (0..churners * sessions_per_churner)
            .map(|i| format!("s{i}"))
            .collect();
        let stop = Arc::new(AtomicBool::new(false));

        let selectors: Vec<_> = (0..2)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let q = q.clone();
                let known = known.clone();
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        if let Some(consumer) = registry.try_get_consumer(&q) {
                            assert!(known.contains(consumer.session_id().as_str()));
                        }
                    }
                })
            })
            .collect();

        let handles: Vec<_> = (0..churners)
            .map(|t| {
                let registry = Arc::clone(&registry);
                let q = q.clone();
                std::thread::spawn(move || {
                    for round in 0..500 {
                        let index = t * sessions_per_churner + round % sessions_per_churner;
                        let session = format!("s{index}");
                        let (consumer, receiver) = local_consumer(session.as_str());
                        registry.add_consumer(&q, consumer);
                        if round % 2 == 0 {
                            // Close from this thread; the hook detaches it.
                            drop(receiver);
                        } else {
                            let session_id = SessionId::from(session.as_str());
                            _ = registry.remove_consumer(&q, &session_id);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("churn thread");
        }
        stop.store(true, Ordering::SeqCst);
        for selector in selectors {
            selector.join().expect("selector thread");
        }

        assert_eq!(registry.consumer_count(&q), 0);
        assert!(registry.try_get_consumer(&q).is_none());

        // The list is still usable after the churn.
        let (consumer, _receiver) = local_consumer("after");
        registry.add_consumer(&q, consumer);
        assert_eq!(selected(&registry, &q).as_deref(), Some("after"));
    }
}
