//! Notification pump
//!
//! The debug layer may deliver notifications from any thread; they are
//! funneled through one `mpsc` channel into a single consumer, so all session
//! state is mutated from one place. After every notification the pump drains
//! the resume queue, outside the handler that filled it.

use std::time::Instant;

use race_core::Notification;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatcher::{EventDispatcher, dispatch_and_flush};
use crate::session::{RunOutcome, Session};

/// Sender half handed to the debug layer
pub type NotificationSender = mpsc::UnboundedSender<Notification>;
/// Receiver half consumed by [`Controller::run`]
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Create the notification channel
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

/// Drives a session from a notification stream until it terminates
pub struct Controller {
    dispatcher: EventDispatcher,
}

impl Controller {
    pub fn new(session: Session) -> Self {
        Self {
            dispatcher: EventDispatcher::new(session),
        }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Consume notifications until the session terminates or the stream closes
    ///
    /// While a safepoint wait with a timeout is running, the receive is bounded
    /// by the time left so an idle target still hits the timeout.
    pub async fn run(&mut self, rx: &mut NotificationReceiver) -> RunOutcome {
        loop {
            if let Some(outcome) = self.dispatcher.outcome() {
                return outcome.clone();
            }

            let next = match self.dispatcher.safepoint_remaining(Instant::now()) {
                Some(left) => match tokio::time::timeout(left, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!("safepoint deadline passed");
                        if let Err(e) = self.dispatcher.poll_timeout(Instant::now()) {
                            warn!(error = %e, "abort after safepoint timeout failed");
                        }
                        if let Err(e) = self.dispatcher.flush() {
                            warn!(error = %e, "resume failed");
                        }
                        continue;
                    }
                },
                None => rx.recv().await,
            };

            let Some(notification) = next else {
                warn!("notification stream closed");
                return RunOutcome::Disconnected;
            };

            if let Err(e) = dispatch_and_flush(&mut self.dispatcher, notification) {
                warn!(error = %e, "notification handling failed");
            }
        }
    }

    pub fn into_session(self) -> Session {
        self.dispatcher.into_session()
    }
}
