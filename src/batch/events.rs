use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

/// Messages posted by batch workers. The presentation layer drains them on
/// its own thread; workers never touch UI state directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Progress { fraction: f32 },
    Image { index: usize, payload: String },
    Error { index: usize, message: String },
    Finished { succeeded: usize, failed: usize },
}

impl BatchEvent {
    pub fn dispatch(&self, observer: &mut dyn BatchObserver) {
        match self {
            BatchEvent::Progress { fraction } => observer.on_progress(*fraction),
            BatchEvent::Image { index, payload } => observer.on_image(*index, payload),
            BatchEvent::Error { index, message } => observer.on_error(*index, message),
            BatchEvent::Finished { .. } => observer.on_finished(),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, BatchEvent::Finished { .. })
    }
}

/// UI-side sink for batch events. `index` is the slot the result belongs
/// to; arrival order says nothing about it.
pub trait BatchObserver {
    fn on_progress(&mut self, fraction: f32);
    fn on_image(&mut self, index: usize, base64: &str);
    fn on_error(&mut self, index: usize, message: &str);
    fn on_finished(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Receiving end of one batch. The channel closes right after `Finished`.
pub struct BatchHandle {
    batch_id: String,
    total: usize,
    events: UnboundedReceiver<BatchEvent>,
}

impl BatchHandle {
    pub(crate) fn new(batch_id: String, total: usize, events: UnboundedReceiver<BatchEvent>) -> Self {
        Self {
            batch_id,
            total,
            events,
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Non-blocking; for frame loops that poll once per tick.
    pub fn try_next(&mut self) -> Option<BatchEvent> {
        self.events.try_recv().ok()
    }

    /// For plain threads outside the runtime. Panics if called from
    /// within an async context.
    pub fn blocking_next(&mut self) -> Option<BatchEvent> {
        self.events.blocking_recv()
    }

    /// Hands every event that is ready right now to `observer`; returns how
    /// many were dispatched.
    pub fn try_dispatch(&mut self, observer: &mut dyn BatchObserver) -> usize {
        let mut dispatched = 0;
        while let Some(event) = self.try_next() {
            event.dispatch(observer);
            dispatched += 1;
        }
        dispatched
    }

    pub async fn run(mut self, observer: &mut dyn BatchObserver) -> BatchSummary {
        let mut summary = BatchSummary::default();
        while let Some(event) = self.next_event().await {
            event.dispatch(observer);
            if let BatchEvent::Finished { succeeded, failed } = event {
                summary = BatchSummary { succeeded, failed };
                break;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl BatchObserver for Recorder {
        fn on_progress(&mut self, fraction: f32) {
            self.calls.push(format!("progress {:.2}", fraction));
        }
        fn on_image(&mut self, index: usize, base64: &str) {
            self.calls.push(format!("image {} {}", index, base64));
        }
        fn on_error(&mut self, index: usize, message: &str) {
            self.calls.push(format!("error {} {}", index, message));
        }
        fn on_finished(&mut self) {
            self.calls.push("finished".into());
        }
    }

    #[test]
    fn try_dispatch_drains_ready_events() {
        let (tx, rx) = unbounded_channel();
        let mut handle = BatchHandle::new("b".into(), 2, rx);
        let mut recorder = Recorder::default();

        assert_eq!(handle.try_dispatch(&mut recorder), 0);

        tx.send(BatchEvent::Image { index: 1, payload: "p".into() }).unwrap();
        tx.send(BatchEvent::Progress { fraction: 0.5 }).unwrap();
        assert_eq!(handle.try_dispatch(&mut recorder), 2);
        assert_eq!(recorder.calls, vec!["image 1 p", "progress 0.50"]);
    }

    #[tokio::test]
    async fn run_stops_at_finished() {
        let (tx, rx) = unbounded_channel();
        let handle = BatchHandle::new("b".into(), 1, rx);
        tx.send(BatchEvent::Error { index: 0, message: "boom".into() }).unwrap();
        tx.send(BatchEvent::Progress { fraction: 1.0 }).unwrap();
        tx.send(BatchEvent::Finished { succeeded: 0, failed: 1 }).unwrap();

        let mut recorder = Recorder::default();
        let summary = handle.run(&mut recorder).await;
        assert_eq!(summary, BatchSummary { succeeded: 0, failed: 1 });
        assert_eq!(recorder.calls, vec!["error 0 boom", "progress 1.00", "finished"]);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(BatchEvent::Error { index: 1, message: "x".into() }).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["index"], 1);
    }
}
