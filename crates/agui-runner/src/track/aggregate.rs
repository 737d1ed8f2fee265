use agui_protocol::Event;

/// Merges consecutive `TEXT_MESSAGE_CONTENT` deltas of one message.
///
/// A pending aggregate is released when a different event arrives or on
/// [`flush`](Self::flush).
#[derive(Debug, Default)]
pub struct TextAggregator {
    enabled: bool,
    pending: Option<Event>,
}

impl TextAggregator {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            pending: None,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed one event; returns the events ready to persist, in order.
    pub fn push(&mut self, event: Event) -> Vec<Event> {
        if !self.enabled {
            return vec![event];
        }
        if let Event::TextMessageContent {
            message_id, delta, ..
        } = &event
        {
            if let Some(Event::TextMessageContent {
                message_id: pending_id,
                delta: pending_delta,
                ..
            }) = self.pending.as_mut()
            {
                if pending_id == message_id {
                    pending_delta.push_str(delta);
                    return Vec::new();
                }
            }
            let released = self.flush();
            self.pending = Some(event);
            return released;
        }
        let mut ready = self.flush();
        ready.push(event);
        ready
    }

    pub fn flush(&mut self) -> Vec<Event> {
        self.pending.take().into_iter().collect()
    }
}
