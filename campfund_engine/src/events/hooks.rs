use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{CampaignStatusChangedEvent, EventHandler, EventProducer, Handler, SurplusDetectedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub surplus_detected_producer: Vec<EventProducer<SurplusDetectedEvent>>,
    pub status_changed_producer: Vec<EventProducer<CampaignStatusChangedEvent>>,
}

impl EventProducers {
    pub async fn publish_surplus_detected(&self, event: SurplusDetectedEvent) {
        for producer in &self.surplus_detected_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_status_changed(&self, event: CampaignStatusChangedEvent) {
        for producer in &self.status_changed_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_surplus_detected: Option<EventHandler<SurplusDetectedEvent>>,
    pub on_status_changed: Option<EventHandler<CampaignStatusChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_surplus_detected = hooks.on_surplus_detected.map(|f| EventHandler::new(buffer_size, f));
        let on_status_changed = hooks.on_status_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_surplus_detected, on_status_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_surplus_detected {
            result.surplus_detected_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_status_changed {
            result.status_changed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_surplus_detected {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_status_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_surplus_detected: Option<Handler<SurplusDetectedEvent>>,
    pub on_status_changed: Option<Handler<CampaignStatusChangedEvent>>,
}

impl EventHooks {
    pub fn on_surplus_detected<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SurplusDetectedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_surplus_detected = Some(Arc::new(f));
        self
    }

    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CampaignStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }
}
