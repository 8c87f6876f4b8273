//! FIFO of requests waiting for dispatch

use super::types::{Delivery, Outcome, QueuedSummary, RequestOptions, SchedulerError};
use crate::domain::CancellationKey;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Characters of the first user message shown in queue summaries
pub const SNIPPET_CHARS: usize = 50;

/// Queued requests listed in a status snapshot
pub const SUMMARY_LIMIT: usize = 20;

/// `<millis>-<7 random characters>`
pub fn queued_request_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &random[..7])
}

pub struct QueuedRequest {
    pub id: String,
    pub options: RequestOptions,
    pub delivery: Delivery,
    pub queued_at: DateTime<Utc>,
    pub responder: oneshot::Sender<Result<Outcome, SchedulerError>>,
}

impl QueuedRequest {
    /// Fail the request; the submitter may already have stopped waiting
    pub fn reject(self, error: SchedulerError) {
        let _ = self.responder.send(Err(error));
    }

    pub fn summary(&self) -> QueuedSummary {
        let request = &self.options.request;
        let model = if request.model.is_empty() {
            "default".to_string()
        } else {
            request.model.clone()
        };

        QueuedSummary {
            id: self.id.clone(),
            kind: self.delivery.kind(),
            queued_at: self.queued_at,
            model,
            user_message_snippet: request
                .first_user_message()
                .map(|text| text.chars().take(SNIPPET_CHARS).collect())
                .unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

#[derive(Default)]
pub struct RequestQueue {
    entries: VecDeque<QueuedRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: QueuedRequest) {
        self.entries.push_back(request);
    }

    pub fn pop_front(&mut self) -> Option<QueuedRequest> {
        self.entries.pop_front()
    }

    /// Take the queued request holding `key`, if any
    pub fn remove_by_key(&mut self, key: &CancellationKey) -> Option<QueuedRequest> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.options.cancellation_key.as_ref() == Some(key))?;
        self.entries.remove(position)
    }

    pub fn drain(&mut self) -> Vec<QueuedRequest> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> Vec<QueuedSummary> {
        self.entries
            .iter()
            .take(SUMMARY_LIMIT)
            .map(QueuedRequest::summary)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatCompletionRequest, ChatMessage};
    use crate::scheduler::types::RequestKind;

    type Receiver = oneshot::Receiver<Result<Outcome, SchedulerError>>;

    fn queued(key: Option<&str>, text: &str) -> (QueuedRequest, Receiver) {
        let (responder, rx) = oneshot::channel();
        let options = RequestOptions::new(ChatCompletionRequest::new(
            "gpt-4o",
            vec![ChatMessage::user(text)],
        ))
        .with_cancellation_key(key.map(|key| CancellationKey::try_new(key.to_string()).unwrap()));

        (
            QueuedRequest {
                id: queued_request_id(),
                options,
                delivery: Delivery::Call,
                queued_at: Utc::now(),
                responder,
            },
            rx,
        )
    }

    #[test]
    fn ids_carry_millis_and_random_suffix() {
        let id = queued_request_id();
        let (millis, random) = id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(random.len(), 7);
    }

    #[test]
    fn removal_by_key_only_matches_that_key() {
        let mut queue = RequestQueue::new();
        let (a, _rx_a) = queued(Some("slot-1"), "a");
        let (b, _rx_b) = queued(Some("slot-2"), "b");
        let (c, _rx_c) = queued(None, "c");
        queue.push(a);
        queue.push(b);
        queue.push(c);

        let removed = queue
            .remove_by_key(&CancellationKey::try_new("slot-2".to_string()).unwrap())
            .unwrap();
        assert_eq!(removed.options.request.messages[0].content.text(), "b");
        assert_eq!(queue.len(), 2);
        assert!(queue
            .remove_by_key(&CancellationKey::try_new("slot-3".to_string()).unwrap())
            .is_none());
    }

    #[test]
    fn summaries_truncate_snippets_and_list() {
        let mut queue = RequestQueue::new();
        let long = "é".repeat(80);
        for _ in 0..25 {
            let (entry, _rx) = queued(None, &long);
            queue.push(entry);
        }

        let summaries = queue.summaries();
        assert_eq!(summaries.len(), SUMMARY_LIMIT);
        assert_eq!(summaries[0].user_message_snippet.chars().count(), SNIPPET_CHARS);
        assert_eq!(summaries[0].kind, RequestKind::Call);
        assert_eq!(summaries[0].model, "gpt-4o");
    }

    #[tokio::test]
    async fn rejection_reaches_the_submitter() {
        let (entry, rx) = queued(None, "a");
        entry.reject(SchedulerError::Destroyed);
        assert!(matches!(rx.await, Ok(Err(SchedulerError::Destroyed))));
    }
}
