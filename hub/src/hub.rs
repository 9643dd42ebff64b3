use std::collections::HashMap;

use garimpo_lib::{Source, Task};
use garimpo_taskpool::ProgressSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use utoipa::ToSchema;

use crate::{AlertLevel, Event};

/// Capacity of each subscriber channel. A client that falls this far behind
/// is considered dead and gets evicted rather than backpressuring publishers.
const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HubStats {
    pub total_subscribers: usize,
    pub active_investigations: usize,
    #[schema(value_type = Object)]
    pub by_investigation: HashMap<String, usize>,
}

enum HubCommand {
    Subscribe {
        investigation_id: String,
        channel: mpsc::Sender<Event>,
    },
    Publish {
        event: Event,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Handle to the notification hub.
///
/// The subscription registry is owned by a single background task; every
/// operation is a command on its queue, so per-subscriber delivery order
/// matches publication order and no lock is held across sends. Publishing is
/// fire-and-forget: it never blocks and never reports delivery failures;
/// subscribers whose channel refuses a send are silently evicted.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl NotificationHub {
    /// Spawn the registry task and return a handle to it. The task exits
    /// when the last handle is dropped.
    pub fn spawn() -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(Registry::default().run(rx));
        Self { commands }
    }

    /// Attach a client to one investigation. The returned receiver yields a
    /// `connected` greeting, then every event for that investigation plus
    /// system-wide events, until the client drops it.
    pub fn subscribe(&self, investigation_id: &str) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let _ = self.commands.send(HubCommand::Subscribe {
            investigation_id: investigation_id.to_string(),
            channel: tx,
        });
        rx
    }

    /// Publish an event; scope is derived from the event itself.
    pub fn publish(&self, event: Event) {
        garimpo_metrics::inc_hub_event_count(&event);
        let _ = self.commands.send(HubCommand::Publish { event });
    }

    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        let _ = self.commands.send(HubCommand::Stats { reply });
        rx.await.unwrap_or_default()
    }

    // Lifecycle notification helpers used by the workers and the facade.

    pub fn notify_task_started(&self, task: &Task) {
        self.publish(Event::task_started(task));
    }

    pub fn notify_task_completed(&self, task: &Task) {
        self.publish(Event::task_completed(task));
    }

    pub fn notify_task_retrying(&self, task: &Task) {
        self.publish(Event::task_retrying(task));
    }

    pub fn notify_task_failed(&self, task: &Task) {
        self.publish(Event::task_failed(task));
    }

    pub fn notify_investigation_progress(&self, snapshot: &ProgressSnapshot) {
        self.publish(Event::investigation_progress(snapshot));
    }

    pub fn notify_circuit_breaker_opened(&self, source: Source, failures: u32) {
        self.publish(Event::circuit_breaker_opened(source, failures));
    }

    pub fn notify_system_alert(&self, level: AlertLevel, message: impl Into<String>) {
        self.publish(Event::system_alert(level, message));
    }
}

#[derive(Default)]
struct Registry {
    // {investigation_id: [subscriber channels]}
    subscribers: HashMap<String, Vec<mpsc::Sender<Event>>>,
}

impl Registry {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Subscribe {
                    investigation_id,
                    channel,
                } => {
                    // Greeting goes out before any later event so clients can
                    // treat it as a subscription ack.
                    let _ = channel.try_send(Event::connected(&investigation_id));
                    self.subscribers
                        .entry(investigation_id.clone())
                        .or_default()
                        .push(channel);
                    tracing::info!(
                        "NotificationHub: subscriber attached to {investigation_id}, {} total",
                        self.total()
                    );
                    garimpo_metrics::set_hub_subscriber_count(self.total());
                }
                HubCommand::Publish { event } => {
                    self.deliver(event);
                    garimpo_metrics::set_hub_subscriber_count(self.total());
                }
                HubCommand::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
            }
        }
    }

    fn deliver(&mut self, event: Event) {
        match event.investigation_id() {
            Some(investigation_id) => {
                let Some(channels) = self.subscribers.get_mut(investigation_id) else {
                    return;
                };
                let before = channels.len();
                channels.retain(|channel| channel.try_send(event.clone()).is_ok());
                let evicted = before - channels.len();
                if evicted > 0 {
                    tracing::warn!(
                        "NotificationHub: evicted {evicted} dead subscriber(s) of {investigation_id}"
                    );
                    for _ in 0..evicted {
                        garimpo_metrics::inc_hub_subscriber_evicted_count();
                    }
                }
                if channels.is_empty() {
                    self.subscribers.remove(investigation_id);
                }
            }
            None => {
                // System-wide event: every subscriber of every investigation.
                self.subscribers
                    .retain(|investigation_id, channels| {
                        let before = channels.len();
                        channels.retain(|channel| channel.try_send(event.clone()).is_ok());
                        let evicted = before - channels.len();
                        if evicted > 0 {
                            tracing::warn!(
                                "NotificationHub: evicted {evicted} dead subscriber(s) of {investigation_id}"
                            );
                            for _ in 0..evicted {
                                garimpo_metrics::inc_hub_subscriber_evicted_count();
                            }
                        }
                        !channels.is_empty()
                    });
            }
        }
    }

    fn total(&self) -> usize {
        self.subscribers.values().map(Vec::len).sum()
    }

    fn stats(&self) -> HubStats {
        HubStats {
            total_subscribers: self.total(),
            active_investigations: self.subscribers.len(),
            by_investigation: self
                .subscribers
                .iter()
                .map(|(investigation_id, channels)| (investigation_id.clone(), channels.len()))
                .collect(),
        }
    }
}
