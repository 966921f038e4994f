use tokio::sync::mpsc;

/// A transient, non-blocking notice surfaced to the user. Failures never
/// block the app; the prior session list stays interactive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }
}

/// Output seam for user-visible notifications; the UI layer decides how
/// to render them.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Forwards notices over an unbounded channel to whatever loop is
/// driving the terminal.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        // Receiver gone means the UI is shutting down; dropping the
        // notice is fine.
        let _ = self.tx.send(notice);
    }
}

/// Swallows everything. Useful for headless flows and tests that do not
/// assert on notifications.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: Notice) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_notifier_forwards_notices() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notice::error("sin conexión"));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.kind, NoticeKind::Error);
        assert_eq!(received.text, "sin conexión");
    }

    #[test]
    fn dropped_receiver_is_tolerated() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(Notice::info("ignored"));
    }
}
