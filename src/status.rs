use crate::models::{ConnectionState, LogEntry, StatusStyle};
use log::info;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;

/// What the operator sees: the status pill, the subscribed topic and the
/// event log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusView {
    pub label: String,
    pub style: StatusStyle,
    pub topic: Option<String>,
    pub log: Vec<LogEntry>,
}

/// Maps a connection state, plus the message that accompanied it, to a
/// display label and style.
pub fn describe(state: ConnectionState, detail: Option<&str>) -> (String, StatusStyle) {
    match (state, detail) {
        (ConnectionState::Idle, _) => ("Idle".to_string(), StatusStyle::Default),
        (ConnectionState::Connecting, _) => ("Connecting...".to_string(), StatusStyle::Default),
        (ConnectionState::Connected, _) => ("Connected".to_string(), StatusStyle::Connected),
        (ConnectionState::Reconnecting, _) => {
            ("Reconnecting...".to_string(), StatusStyle::Default)
        }
        (ConnectionState::Error, Some(detail)) => (format!("Error: {}", detail), StatusStyle::Error),
        (ConnectionState::Error, None) => ("Error".to_string(), StatusStyle::Error),
        (ConnectionState::Closed, _) => ("Connection closed".to_string(), StatusStyle::Default),
    }
}

pub struct StatusReporter {
    view: watch::Sender<StatusView>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        let (view, _) = watch::channel(StatusView::default());
        Self { view }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusView> {
        self.view.subscribe()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> StatusView {
        self.view.borrow().clone()
    }

    pub fn set_status(&self, label: impl Into<String>, style: StatusStyle) {
        let label = label.into();
        self.view.send_modify(|view| {
            view.label = label;
            view.style = style;
        });
    }

    pub fn show_state(&self, state: ConnectionState, detail: Option<&str>) {
        let (label, style) = describe(state, detail);
        self.set_status(label, style);
    }

    pub fn set_topic(&self, topic: &str) {
        let topic = topic.to_string();
        self.view.send_modify(|view| view.topic = Some(topic));
    }

    pub fn log(&self, text: impl Into<String>) {
        let entry = LogEntry {
            time: OffsetDateTime::now_utc(),
            text: text.into(),
        };
        info!("{}", entry.text);
        self.view.send_modify(|view| view.log.push(entry));
    }

    pub fn log_message(&self, topic: &str, payload: &str) {
        self.log(format!("{} → {}", topic, payload));
    }
}
