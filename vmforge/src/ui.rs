//! User-facing diagnostics.
//!
//! Steps report progress and failures through [`Ui`]. Calls are
//! fire-and-forget; nothing a reporter does can change a step's outcome.

use parking_lot::Mutex;

pub trait Ui: Send + Sync {
    /// Informational progress message.
    fn say(&self, message: &str);

    /// Failure or diagnostic message.
    fn error(&self, message: &str);
}

/// Forwards messages to `tracing` under the `vmforge::ui` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUi;

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        tracing::info!(target: "vmforge::ui", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "vmforge::ui", "{}", message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiMessage {
    Say(String),
    Error(String),
}

impl UiMessage {
    pub fn text(&self) -> &str {
        match self {
            UiMessage::Say(text) | UiMessage::Error(text) => text,
        }
    }
}

/// Keeps every message in order, for embedding callers and tests.
#[derive(Debug, Default)]
pub struct CapturingUi {
    messages: Mutex<Vec<UiMessage>>,
}

impl CapturingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<UiMessage> {
        self.messages.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                UiMessage::Error(text) => Some(text.clone()),
                UiMessage::Say(_) => None,
            })
            .collect()
    }

    pub fn says(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                UiMessage::Say(text) => Some(text.clone()),
                UiMessage::Error(_) => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<UiMessage> {
        self.messages.lock().last().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Whether any message contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|m| m.text().contains(needle))
    }
}

impl Ui for CapturingUi {
    fn say(&self, message: &str) {
        tracing::info!(target: "vmforge::ui", "{}", message);
        self.messages.lock().push(UiMessage::Say(message.to_string()));
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "vmforge::ui", "{}", message);
        self.messages
            .lock()
            .push(UiMessage::Error(message.to_string()));
    }
}
