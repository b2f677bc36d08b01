//! Store Subscription Manager.
//!
//! Stores are user-supplied objects satisfying the subscribe contract:
//! `subscribe` invokes the callback synchronously with the current value
//! before returning, then again on every change, and returns an unsubscribe
//! handle that guarantees no further invocations once called. The core
//! validates writability before forwarding writes; it never creates stores.

use crate::binding::Value;

pub type Subscriber = Box<dyn FnMut(Value)>;
pub type Unsubscriber = Box<dyn FnOnce()>;

pub trait Store {
    /// Must call `subscriber` with the current value before returning.
    fn subscribe(&self, subscriber: Subscriber) -> Unsubscriber;

    /// Whether the store exposes a `set` method.
    fn writable(&self) -> bool {
        false
    }

    /// Pushes a new value into the store. Only called after `writable()`
    /// returned true.
    fn set(&self, _value: Value) {}
}

// ═══════════════════════════════════════════════════════════════════════════════
// SUBSCRIPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// One active subscription: the `$`-prefixed binding it feeds plus the
/// unsubscribe handle, consumed exactly once on disposal.
pub struct StoreSubscription {
    pub binding: String,
    unsubscribe: Option<Unsubscriber>,
}

impl StoreSubscription {
    pub fn new(binding: &str, unsubscribe: Unsubscriber) -> Self {
        StoreSubscription {
            binding: binding.to_string(),
            unsubscribe: Some(unsubscribe),
        }
    }

    pub fn dispose(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }
}

impl std::fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSubscription")
            .field("binding", &self.binding)
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionManager {
    subscriptions: Vec<StoreSubscription>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        SubscriptionManager::default()
    }

    pub fn attach(&mut self, subscription: StoreSubscription) {
        self.subscriptions.push(subscription);
    }

    /// Tears every subscription down. Idempotent: each unsubscribe handle
    /// fires at most once no matter how often this runs.
    pub fn dispose_all(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.dispose();
        }
    }

    pub fn active_count(&self) -> usize {
        self.subscriptions.iter().filter(|s| s.is_active()).count()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEST STORES
// ═══════════════════════════════════════════════════════════════════════════════


#[cfg(test)]
mod tests {
    use super::test_stores::ValueStore;
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_subscribe_fires_synchronously_with_current_value() {
        let store = ValueStore::writable(Value::from(7));
        let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _unsub = store.subscribe(Box::new(move |v| sink.borrow_mut().push(v)));
        // Value observable before subscribe returned control to us.
        assert_eq!(seen.borrow().as_slice(), &[Value::from(7)]);
    }

    #[test]
    fn test_unsubscribe_stops_callbacks() {
        let store = ValueStore::writable(Value::from(0));
        let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let unsub = store.subscribe(Box::new(move |v| sink.borrow_mut().push(v)));
        unsub();
        store.push(Value::from(1));
        store.push(Value::from(2));
        assert_eq!(seen.borrow().len(), 1, "only the initial synchronous call");
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_dispose_is_idempotent() {
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        let mut subscription =
            StoreSubscription::new("$time", Box::new(move || *counter.borrow_mut() += 1));
        assert!(subscription.is_active());
        subscription.dispose();
        subscription.dispose();
        assert_eq!(*fired.borrow(), 1);
        assert!(!subscription.is_active());
    }

    #[test]
    fn test_manager_disposes_everything_once() {
        let fired = Rc::new(RefCell::new(0));
        let mut manager = SubscriptionManager::new();
        for name in ["$a", "$b"] {
            let counter = Rc::clone(&fired);
            manager.attach(StoreSubscription::new(
                name,
                Box::new(move || *counter.borrow_mut() += 1),
            ));
        }
        assert_eq!(manager.active_count(), 2);
        manager.dispose_all();
        manager.dispose_all();
        assert_eq!(*fired.borrow(), 2);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_readable_store_reports_not_writable() {
        let store = ValueStore::readable(Value::from("tick"));
        assert!(!store.writable());
    }
}
