//! Captures events published on the simulated bus while recording is on.

use saga_env::EventMessage;

/// Append-only capture of published events.
#[derive(Debug, Default)]
pub struct EventRecorder {
    recording: bool,
    events: Vec<EventMessage>,
}

impl EventRecorder {
    /// Creates a recorder that is not yet recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears any capture and starts recording.
    pub fn start_recording(&mut self) {
        self.events.clear();
        self.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Captures `event` if recording.
    pub fn record(&mut self, event: &EventMessage) {
        if self.recording {
            self.events.push(event.clone());
        }
    }

    /// Returns captured events in publication order.
    pub fn events(&self) -> &[EventMessage] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str) -> EventMessage {
        EventMessage::new(text.to_string()).unwrap()
    }

    #[test]
    fn test_ignores_events_before_recording() {
        let mut recorder = EventRecorder::new();
        recorder.record(&event("setup"));
        assert!(recorder.events().is_empty());

        recorder.start_recording();
        recorder.record(&event("a"));
        recorder.record(&event("b"));

        let captured: Vec<String> = recorder.events().iter().map(|e| e.decode().unwrap()).collect();
        assert_eq!(captured, vec!["a", "b"]);
    }

    #[test]
    fn test_start_recording_clears() {
        let mut recorder = EventRecorder::new();
        recorder.start_recording();
        recorder.record(&event("a"));
        recorder.start_recording();
        assert!(recorder.events().is_empty());
        assert!(recorder.is_recording());
    }
}
