//! In-memory bus fakes (testing only)
//!
//! `MemoryBus` implements both [`TriggerBus`] and [`ResultInbox`]. Each
//! `receive` call pops one scripted delivery: a batch of messages or an
//! injected error. Once the script is exhausted, `receive` returns empty
//! batches.
//!
//! Replies registered with [`MemoryBus::reply_to`] stand in for the remote
//! workers: publishing a trigger for that check queues the reply under the
//! trigger's correlation id.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::bus::*;

#[derive(Debug)]
enum Delivery {
    Batch(Vec<ResultMessage>),
    Failure(BusError),
}

#[derive(Debug, Default)]
struct InboxState {
    script: VecDeque<Delivery>,
    receive_calls: u32,
    acknowledged: Vec<String>,
}

/// Scriptable in-memory bus.
#[derive(Debug, Default)]
pub struct MemoryBus {
    published: Mutex<Vec<(String, TriggerMessage)>>,
    inbox: Mutex<InboxState>,
    fail_publish_after: Mutex<Option<usize>>,
    replies: Mutex<HashMap<String, Vec<(ResultKind, Option<String>)>>>,
    next_receipt: AtomicU64,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one batch, returned by a single `receive` call.
    pub fn push_batch(&self, messages: Vec<ResultMessage>) {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.script.push_back(Delivery::Batch(messages));
    }

    /// Queue an error, returned by a single `receive` call.
    pub fn push_failure(&self, error: BusError) {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.script.push_back(Delivery::Failure(error));
    }

    /// Make every publish after the first `n` fail.
    pub fn fail_publish_after(&self, n: usize) {
        *self.fail_publish_after.lock().unwrap() = Some(n);
    }

    /// Answer every trigger for `check` with a result of `kind`. Registering
    /// several replies for one check delivers each as its own batch, in order.
    pub fn reply_to(&self, check: &str, kind: ResultKind, message: Option<&str>) {
        self.replies
            .lock()
            .unwrap()
            .entry(check.to_string())
            .or_default()
            .push((kind, message.map(str::to_string)));
    }

    /// Triggers published so far, with their topic.
    pub fn published(&self) -> Vec<(String, TriggerMessage)> {
        self.published.lock().unwrap().clone()
    }

    pub fn receive_calls(&self) -> u32 {
        self.inbox.lock().unwrap().receive_calls
    }

    /// Receipts acknowledged so far.
    pub fn acknowledged(&self) -> Vec<String> {
        self.inbox.lock().unwrap().acknowledged.clone()
    }
}

#[async_trait]
impl TriggerBus for MemoryBus {
    async fn publish(&self, topic: &str, message: &TriggerMessage) -> BusResult<String> {
        let mut published = self.published.lock().unwrap();
        if let Some(limit) = *self.fail_publish_after.lock().unwrap() {
            if published.len() >= limit {
                return Err(BusError::Fatal(format!("topic {topic} rejected publish")));
            }
        }
        published.push((topic.to_string(), message.clone()));

        if let Some(check) = &message.check_name {
            if let Some(replies) = self.replies.lock().unwrap().get(check) {
                let mut inbox = self.inbox.lock().unwrap();
                for (kind, text) in replies {
                    inbox.script.push_back(Delivery::Batch(vec![ResultMessage::new(
                        message.uuid.clone(),
                        check.clone(),
                        *kind,
                        text.as_deref(),
                    )]));
                }
            }
        }
        Ok(format!("msg-{}", published.len()))
    }
}

#[async_trait]
impl ResultInbox for MemoryBus {
    async fn receive(&self, max_messages: usize) -> BusResult<Vec<InboxMessage>> {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.receive_calls += 1;
        match inbox.script.pop_front() {
            None => Ok(Vec::new()),
            Some(Delivery::Failure(error)) => Err(error),
            Some(Delivery::Batch(mut messages)) => {
                if messages.len() > max_messages {
                    let rest = messages.split_off(max_messages);
                    inbox.script.push_front(Delivery::Batch(rest));
                }
                Ok(messages
                    .into_iter()
                    .map(|body| InboxMessage {
                        receipt: format!(
                            "receipt-{}",
                            self.next_receipt.fetch_add(1, Ordering::Relaxed)
                        ),
                        body,
                    })
                    .collect())
            }
        }
    }

    async fn acknowledge(&self, receipts: &[String]) -> BusResult<()> {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.acknowledged.extend(receipts.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CheckContext, CorrelationId};

    #[tokio::test]
    async fn test_batches_are_split_at_max() {
        let bus = MemoryBus::new();
        bus.push_batch(vec![
            ResultMessage::new("run-1", "QA", ResultKind::Passed, None),
            ResultMessage::new("run-1", "Jira", ResultKind::Passed, None),
            ResultMessage::new("run-1", "GitHub", ResultKind::Passed, None),
        ]);

        assert_eq!(bus.receive(2).await.unwrap().len(), 2);
        let rest = bus.receive(2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].body.check_name, "GitHub");
        assert!(bus.receive(2).await.unwrap().is_empty());
        assert_eq!(bus.receive_calls(), 3);
    }

    #[tokio::test]
    async fn test_reply_follows_trigger_correlation() {
        let bus = MemoryBus::new();
        bus.reply_to("QA", ResultKind::Failed, Some("red"));

        let ctx = CheckContext::new("org", "repo", "main", "1.0.0.1", "abc");
        let id = CorrelationId::from("run-9");
        let trigger = TriggerMessage::new(&ctx, &id, "Results", Some("QA")).unwrap();
        bus.publish("Triggers", &trigger).await.unwrap();

        let received = bus.receive(10).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body.correlation_id, id);
        assert_eq!(received[0].body.kind, ResultKind::Failed);

        bus.acknowledge(&[received[0].receipt.clone()]).await.unwrap();
        assert_eq!(bus.acknowledged(), vec![received[0].receipt.clone()]);
    }
}
