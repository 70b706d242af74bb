use campfund_engine::events::{CampaignStatusChangedEvent, EventHandlers, EventHooks, SurplusDetectedEvent};
use log::*;

pub const EVENT_BUFFER_SIZE: usize = 25;

/// In-process reactions to relayed ledger events.
///
/// 1. SurplusDetectedEvent - a campaign went over its target. Operators decide what happens to the surplus, so it is
///    logged at warn level for them to pick up.
/// 2. CampaignStatusChangedEvent - every lifecycle transition, timed or manual, is logged.
pub fn create_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_surplus_detected(|ev| {
        let SurplusDetectedEvent { campaign_id, target_amount, received_amount } = ev.clone();
        Box::pin(async move {
            warn!(
                "📣️ Campaign {campaign_id} is over its target of {target_amount} by {}. It has received \
                 {received_amount}.",
                ev.surplus()
            );
        })
    });
    hooks.on_status_changed(|ev| {
        let CampaignStatusChangedEvent { campaign_id, from, to, reason } = ev;
        Box::pin(async move {
            let reason = reason.unwrap_or_else(|| "no reason given".to_string());
            info!("📣️ Campaign {campaign_id} moved from {from} to {to} ({reason})");
        })
    });
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}
