//! Typed "notify me when property P of object O changes" registrations.
//!
//! Callbacks do not reach back into the player. They translate the change
//! into a value of type `A`, which [`EventBus::notify`] hands back to the
//! caller. The bus lives on the player loop, so a registration that has been
//! removed can never be invoked afterwards.

use std::{collections::HashMap, hash::Hash};

pub type Callback<E, A> = Box<dyn FnMut(&E) -> Option<A> + Send>;

pub struct EventBus<O, P, E, A> {
    registrations: HashMap<O, HashMap<P, Vec<Callback<E, A>>>>,
}

impl<O, P, E, A> EventBus<O, P, E, A>
where
    O: Eq + Hash + Copy,
    P: Eq + Hash + Copy,
{
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
        }
    }

    pub fn subscribe<F>(&mut self, object: O, property: P, callback: F)
    where
        F: FnMut(&E) -> Option<A> + Send + 'static,
    {
        self.registrations
            .entry(object)
            .or_default()
            .entry(property)
            .or_default()
            .push(Box::new(callback));
    }

    /// Removes the registrations for one property of `object`.
    pub fn unsubscribe(&mut self, object: &O, property: &P) -> bool {
        let Some(properties) = self.registrations.get_mut(object) else {
            return false;
        };

        let removed = properties.remove(property).is_some();
        if properties.is_empty() {
            self.registrations.remove(object);
        }

        removed
    }

    /// Removes every registration for `object`.
    pub fn unsubscribe_all(&mut self, object: &O) -> bool {
        self.registrations.remove(object).is_some()
    }

    pub fn unsubscribe_everything(&mut self) {
        self.registrations.clear();
    }

    /// Runs the callbacks registered for `(object, property)` in
    /// registration order and collects what they produced.
    pub fn notify(&mut self, object: &O, property: &P, event: &E) -> Vec<A> {
        let Some(callbacks) = self
            .registrations
            .get_mut(object)
            .and_then(|properties| properties.get_mut(property))
        else {
            return vec![];
        };

        callbacks.iter_mut().filter_map(|callback| callback(event)).collect()
    }

    pub fn observes(&self, object: &O) -> bool {
        self.registrations.contains_key(object)
    }

    pub fn observed_count(&self) -> usize {
        self.registrations.len()
    }
}

impl<O, P, E, A> Default for EventBus<O, P, E, A>
where
    O: Eq + Hash + Copy,
    P: Eq + Hash + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Bus = EventBus<u32, &'static str, i32, String>;

    #[test]
    fn callbacks_fire_in_registration_order() {
        let mut bus = Bus::new();
        bus.subscribe(1, "status", |value| Some(format!("first {value}")));
        bus.subscribe(1, "status", |value| Some(format!("second {value}")));
        bus.subscribe(1, "rate", |_| Some("rate".to_string()));

        let fired = bus.notify(&1, &"status", &5);
        assert_eq!(fired, ["first 5", "second 5"]);
    }

    #[test]
    fn callbacks_may_decline_to_produce() {
        let mut bus = Bus::new();
        bus.subscribe(1, "status", |value| (*value > 0).then(|| "positive".into()));

        assert!(bus.notify(&1, &"status", &-1).is_empty());
        assert_eq!(bus.notify(&1, &"status", &1), ["positive"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_property() {
        let mut bus = Bus::new();
        bus.subscribe(1, "status", |_| Some("status".into()));
        bus.subscribe(1, "rate", |_| Some("rate".into()));

        assert!(bus.unsubscribe(&1, &"status"));
        assert!(!bus.unsubscribe(&1, &"status"));
        assert!(bus.notify(&1, &"status", &0).is_empty());
        assert_eq!(bus.notify(&1, &"rate", &0), ["rate"]);
    }

    #[test]
    fn empty_objects_are_pruned() {
        let mut bus = Bus::new();
        bus.subscribe(1, "status", |_| None);
        bus.unsubscribe(&1, &"status");

        assert!(!bus.observes(&1));
        assert_eq!(bus.observed_count(), 0);
    }

    #[test]
    fn unsubscribe_all_silences_object() {
        let mut bus = Bus::new();
        bus.subscribe(1, "status", |_| Some("one".into()));
        bus.subscribe(2, "status", |_| Some("two".into()));

        assert!(bus.unsubscribe_all(&1));
        assert!(bus.notify(&1, &"status", &0).is_empty());
        assert_eq!(bus.notify(&2, &"status", &0), ["two"]);

        bus.unsubscribe_everything();
        assert!(bus.notify(&2, &"status", &0).is_empty());
        assert_eq!(bus.observed_count(), 0);
    }

    #[test]
    fn callbacks_keep_their_own_state() {
        let mut bus = Bus::new();
        let mut calls = 0;
        bus.subscribe(1, "status", move |_| {
            calls += 1;
            Some(calls.to_string())
        });

        bus.notify(&1, &"status", &0);
        assert_eq!(bus.notify(&1, &"status", &0), ["2"]);
    }
}
