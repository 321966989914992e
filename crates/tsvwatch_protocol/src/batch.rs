//! A parsed file's events, in persistence order.

use crate::event::Event;
use std::collections::HashMap;
use std::ops::ControlFlow;

/// Events parsed from one input file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    source: String,
    events: Vec<Event>,
}

/// Events of one device within a batch, in batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGroup<'a> {
    pub unit_guid: &'a str,
    pub events: Vec<&'a Event>,
}

impl EventBatch {
    pub fn new(source: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            source: source.into(),
            events,
        }
    }

    /// Name of the file the batch was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Visit every event in order until `f` breaks.
    ///
    /// Returns the number of events visited, including the one that broke.
    pub fn visit<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&Event) -> ControlFlow<()>,
    {
        let mut visited = 0;
        for event in &self.events {
            visited += 1;
            if f(event).is_break() {
                break;
            }
        }
        visited
    }

    /// Group events by unit GUID. Groups appear in order of first occurrence.
    pub fn device_groups(&self) -> Vec<DeviceGroup<'_>> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<DeviceGroup<'_>> = Vec::new();
        for event in &self.events {
            let slot = *index.entry(event.unit_guid.as_str()).or_insert_with(|| {
                groups.push(DeviceGroup {
                    unit_guid: event.unit_guid.as_str(),
                    events: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].events.push(event);
        }
        groups
    }
}
