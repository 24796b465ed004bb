//! State change notifications.
//!
//! Every settled value (polled or reconciled) is published as a
//! [`StateEvent`] on a broadcast bus that also keeps the most recent events.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

/// Observable property of a control.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StateProperty {
    Power,
    Volume,
    Mute,
    Channel,
    Switch,
    OpenApp,
}

/// Property value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StateValue {
    Bool(bool),
    Level(i64),
    Text(String),
}

/// A settled state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEvent {
    pub id: String,
    /// Control name (device name plus button name)
    pub control: String,
    pub property: StateProperty,
    pub value: StateValue,
    pub timestamp: DateTime<Utc>,
}

impl StateEvent {
    pub fn new(control: impl Into<String>, property: StateProperty, value: StateValue) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            control: control.into(),
            property,
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn level(&self) -> Option<i64> {
        match self.value {
            StateValue::Level(level) => Some(level),
            _ => None,
        }
    }

    pub fn flag(&self) -> Option<bool> {
        match self.value {
            StateValue::Bool(flag) => Some(flag),
            _ => None,
        }
    }
}

/// Event filter for subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub control: Option<String>,
    pub properties: Option<Vec<StateProperty>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(mut self, control: impl Into<String>) -> Self {
        self.control = Some(control.into());
        self
    }

    pub fn property(mut self, property: StateProperty) -> Self {
        self.properties.get_or_insert_with(Vec::new).push(property);
        self
    }

    pub fn matches(&self, event: &StateEvent) -> bool {
        if let Some(control) = &self.control {
            if &event.control != control {
                return false;
            }
        }

        if let Some(properties) = &self.properties {
            if !properties.contains(&event.property) {
                return false;
            }
        }

        true
    }
}

/// Broadcast bus for state events.
#[derive(Clone)]
pub struct StateEventBus {
    broadcast_tx: broadcast::Sender<StateEvent>,
    recent_events: Arc<RwLock<VecDeque<StateEvent>>>,
    max_stored: usize,
}

impl StateEventBus {
    pub fn new(max_stored: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);

        Self {
            broadcast_tx,
            recent_events: Arc::new(RwLock::new(VecDeque::new())),
            max_stored,
        }
    }

    pub async fn publish(&self, event: StateEvent) {
        let mut events = self.recent_events.write().await;
        events.push_back(event.clone());
        while events.len() > self.max_stored {
            events.pop_front();
        }
        drop(events);

        // No subscribers is fine.
        let _ = self.broadcast_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredSubscriber {
        FilteredSubscriber {
            rx: self.broadcast_tx.subscribe(),
            filter,
        }
    }

    /// The last `limit` events, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<StateEvent> {
        let events = self.recent_events.read().await;
        let start = events.len().saturating_sub(limit);
        events.iter().skip(start).cloned().collect()
    }

    /// Most recent event for a control and property.
    pub async fn latest(&self, control: &str, property: StateProperty) -> Option<StateEvent> {
        let events = self.recent_events.read().await;
        events
            .iter()
            .rev()
            .find(|e| e.control == control && e.property == property)
            .cloned()
    }

    pub async fn clear(&self) {
        self.recent_events.write().await.clear();
    }
}

impl Default for StateEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Subscriber that skips events not matching its filter.
pub struct FilteredSubscriber {
    rx: broadcast::Receiver<StateEvent>,
    filter: EventFilter,
}

impl FilteredSubscriber {
    pub async fn recv(&mut self) -> Result<StateEvent, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let filter = EventFilter::new()
            .control("TV Volume")
            .property(StateProperty::Volume);

        let event = StateEvent::new("TV Volume", StateProperty::Volume, StateValue::Level(12));
        assert!(filter.matches(&event));

        let other = StateEvent::new("TV", StateProperty::Volume, StateValue::Level(12));
        assert!(!filter.matches(&other));

        let mute = StateEvent::new("TV Volume", StateProperty::Mute, StateValue::Bool(true));
        assert!(!filter.matches(&mute));
    }

    #[tokio::test]
    async fn test_bus_keeps_bounded_recent() {
        let bus = StateEventBus::new(3);
        for level in 0..5 {
            bus.publish(StateEvent::new("TV", StateProperty::Volume, StateValue::Level(level)))
                .await;
        }

        let recent = bus.recent(10).await;
        let levels: Vec<_> = recent.iter().filter_map(StateEvent::level).collect();
        assert_eq!(levels, vec![2, 3, 4]);

        let latest = bus.latest("TV", StateProperty::Volume).await.unwrap();
        assert_eq!(latest.level(), Some(4));
    }

    #[tokio::test]
    async fn test_filtered_subscriber() {
        let bus = StateEventBus::default();
        let mut sub = bus.subscribe_filtered(EventFilter::new().property(StateProperty::Power));

        bus.publish(StateEvent::new("TV", StateProperty::Volume, StateValue::Level(3)))
            .await;
        bus.publish(StateEvent::new("TV", StateProperty::Power, StateValue::Bool(true)))
            .await;

        let event = sub.recv().await.unwrap();
        assert_eq!(event.property, StateProperty::Power);
        assert_eq!(event.flag(), Some(true));
    }
}
