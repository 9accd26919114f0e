//! Event bus helpers

use babel_common::events::{DisplayUpdate, QueryEvent, RequestId, RequestPhase};
use tokio::sync::broadcast;

/// Next event matching `predicate`, skipping everything else
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<QueryEvent>, predicate: F) -> QueryEvent
where
    F: Fn(&QueryEvent) -> bool,
{
    loop {
        let event = rx.recv().await.expect("event bus closed");
        if predicate(&event) {
            return event;
        }
    }
}

/// Every event up to and including the `Settled` update for `request_id`
pub async fn collect_until_settled(
    rx: &mut broadcast::Receiver<QueryEvent>,
    request_id: RequestId,
) -> Vec<QueryEvent> {
    let mut events = Vec::new();
    loop {
        let event = rx.recv().await.expect("event bus closed");
        let done = matches!(
            &event,
            QueryEvent::Updated(update)
                if update.request_id == request_id && update.phase == RequestPhase::Settled
        );
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Final `Settled` update in a collected event list
pub fn settled_update(events: &[QueryEvent]) -> DisplayUpdate {
    events
        .iter()
        .rev()
        .find_map(|e| match e {
            QueryEvent::Updated(update) if update.phase == RequestPhase::Settled => {
                Some(update.clone())
            }
            _ => None,
        })
        .expect("no settled update")
}
