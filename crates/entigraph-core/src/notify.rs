//! # Change Feed
//!
//! Notification contract between the store and whatever renders it.
//!
//! The store emits one `ChangeEvent` per mutation (a merge, a GC removal, a
//! reset). Subscribers either see every event (`subscribe`) or only events
//! touching the `(typeKey, id)` keys they last read (`watch`). The feed knows
//! nothing about rendering.

use crate::EntityRef;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Handle returned by `subscribe`/`watch`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// A mutation of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Records written by one merge, in write order.
    Merged(Vec<EntityRef>),
    /// Records removed by one GC pass.
    Removed(Vec<EntityRef>),
    /// Every record was dropped.
    Reset,
}

impl ChangeEvent {
    /// Check if the event concerns any of `keys`.
    #[must_use]
    pub fn touches(&self, keys: &BTreeSet<EntityRef>) -> bool {
        match self {
            Self::Merged(refs) | Self::Removed(refs) => refs.iter().any(|r| keys.contains(r)),
            Self::Reset => !keys.is_empty(),
        }
    }
}

type Callback = Box<dyn FnMut(&ChangeEvent)>;

struct Subscriber {
    /// `None` means every event.
    keys: Option<BTreeSet<EntityRef>>,
    callback: Callback,
}

/// Registry of change subscribers.
#[derive(Default)]
pub struct ChangeFeed {
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
    next_id: u64,
}

impl fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl ChangeFeed {
    /// Create an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event.
    pub fn subscribe(&mut self, callback: impl FnMut(&ChangeEvent) + 'static) -> SubscriptionId {
        self.add(None, Box::new(callback))
    }

    /// Receive events touching any of `keys`.
    pub fn watch(
        &mut self,
        keys: impl IntoIterator<Item = EntityRef>,
        callback: impl FnMut(&ChangeEvent) + 'static,
    ) -> SubscriptionId {
        self.add(Some(keys.into_iter().collect()), Box::new(callback))
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver an event to every interested subscriber, in subscription order.
    pub(crate) fn emit(&mut self, event: &ChangeEvent) {
        for subscriber in self.subscribers.values_mut() {
            let interested = subscriber
                .keys
                .as_ref()
                .is_none_or(|keys| event.touches(keys));
            if interested {
                (subscriber.callback)(event);
            }
        }
    }

    fn add(&mut self, keys: Option<BTreeSet<EntityRef>>, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.subscribers.insert(id, Subscriber { keys, callback });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn watchers_only_see_their_keys() {
        let mut feed = ChangeFeed::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        feed.watch([EntityRef::new("post", "1")], move |event| {
            sink.borrow_mut().push(event.clone());
        });

        feed.emit(&ChangeEvent::Merged(vec![EntityRef::new("post", "2")]));
        feed.emit(&ChangeEvent::Removed(vec![EntityRef::new("post", "1")]));
        feed.emit(&ChangeEvent::Reset);

        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[1], ChangeEvent::Reset);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut feed = ChangeFeed::new();
        let count = Rc::new(RefCell::new(0usize));
        let sink = Rc::clone(&count);
        let id = feed.subscribe(move |_| *sink.borrow_mut() += 1);

        feed.emit(&ChangeEvent::Reset);
        assert!(feed.unsubscribe(id));
        assert!(!feed.unsubscribe(id));
        feed.emit(&ChangeEvent::Reset);

        assert_eq!(*count.borrow(), 1);
        assert!(feed.is_empty());
    }
}
