use tokio::sync::{Mutex, broadcast};

use crate::dto::sse::ServerEvent;

/// Public and control SSE hubs held by [`super::AppState`].
pub struct SseState {
    public: SseHub,
    control: ControlSseState,
}

impl SseState {
    pub fn new(public_capacity: usize, control_capacity: usize) -> Self {
        Self {
            public: SseHub::new(public_capacity),
            control: ControlSseState {
                hub: SseHub::new(control_capacity),
                token: Mutex::new(None),
            },
        }
    }

    pub fn public(&self) -> &SseHub {
        &self.public
    }

    pub fn control(&self) -> &ControlSseState {
        &self.control
    }
}

/// Control stream hub plus the token handed to its single subscriber.
pub struct ControlSseState {
    hub: SseHub,
    token: Mutex<Option<String>>,
}

impl ControlSseState {
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }

    /// Token currently held by the connected control client, if any.
    pub fn token(&self) -> &Mutex<Option<String>> {
        &self.token
    }
}

/// Broadcast hub fanning events out to SSE subscribers.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to current subscribers; having none is not an error.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}
