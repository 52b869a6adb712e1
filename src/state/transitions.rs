use crate::{
    error::ServiceError,
    services::sse_events::broadcast_clock,
    state::{
        SharedState, Transition,
        clock::{ClockEvent, GameClock},
        display::SyncMessage,
    },
};

/// Execute a clock transition, then push the new clock to mirrors and SSE streams.
///
/// Unchanged clocks are not broadcast.
pub async fn run_transition_with_broadcast<F, Fut, T>(
    state: &SharedState,
    event: ClockEvent,
    work: F,
) -> Result<Transition<T>, ServiceError>
where
    F: FnOnce(GameClock) -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
{
    let transition = state.run_transition(event, work).await?;
    if let Transition::Applied { clock, .. } = &transition {
        state.publish_sync(SyncMessage::Clock(*clock));
        broadcast_clock(state, clock);
    }
    Ok(transition)
}
