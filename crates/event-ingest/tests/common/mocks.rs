// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock collectors for testing the ingest endpoint without a broker

use event_ingest::collector::{CollectorError, EventCollector};
use event_ingest::context::RequestContext;
use event_ingest::event::Event;
use std::collections::HashSet;
use std::sync::Mutex;

/// Collector that keeps every received event in memory and rejects the configured ids.
#[derive(Default)]
pub struct InMemoryCollector {
    events: Mutex<Vec<Event>>,
    reject: HashSet<String>,
}

impl InMemoryCollector {
    #[allow(dead_code)]
    pub fn rejecting(ids: &[&str]) -> Self {
        InMemoryCollector {
            events: Mutex::new(Vec::new()),
            reject: ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.events().iter().map(|e| e.id().to_string()).collect();
        ids.sort();
        ids
    }
}

#[async_trait::async_trait]
impl EventCollector for InMemoryCollector {
    async fn receive(&self, _ctx: &RequestContext, event: Event) -> Result<(), CollectorError> {
        let rejected = self.reject.contains(event.id());
        self.events.lock().unwrap().push(event);
        if rejected {
            return Err(CollectorError::Rejected("broker unavailable".to_string()));
        }
        Ok(())
    }
}
