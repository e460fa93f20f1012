//! Bounded priority queue of admitted requests.
//!
//! This is a pure synchronous state machine with no internal locking; the
//! processor actor is its single owner and serializes every mutation.
//!
//! # Ordering
//!
//! Pending requests are kept sorted by priority (highest first), then by
//! insertion order within a tier. The head is always the next request to
//! play.
//!
//! # Full Queue
//!
//! When the queue is at capacity an arrival with strictly higher priority
//! than the tail evicts the tail (the lowest-priority, most recently queued
//! request). Any other arrival is rejected and counted as dropped.

// Queue positions are bounded by max_size (<= 1000)
#![allow(clippy::cast_possible_truncation)]

use std::collections::VecDeque;

use chatvox_core::{QueuedRequestDto, RequestStatus, TtsRequest};

/// Result of [`RequestQueue::enqueue`].
#[derive(Debug)]
pub enum Enqueued {
    /// The request was queued at the 1-based `position`.
    Accepted {
        position: u32,
        /// A lower-priority request displaced to make room.
        evicted: Option<TtsRequest>,
    },
    /// The queue was full and the request could not displace anything.
    Dropped(TtsRequest),
}

#[derive(Debug)]
pub struct RequestQueue {
    pending: VecDeque<TtsRequest>,
    max_size: u32,
    dropped: u64,
}

impl RequestQueue {
    pub const fn new(max_size: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            max_size,
            dropped: 0,
        }
    }

    pub const fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Requests rejected or evicted because the queue was full.
    pub const fn dropped_count(&self) -> u64 {
        self.dropped
    }

    fn is_full(&self) -> bool {
        self.pending.len() >= self.max_size as usize
    }

    pub fn enqueue(&mut self, mut request: TtsRequest) -> Enqueued {
        let mut evicted = None;

        if self.is_full() {
            let displaces_tail = self
                .pending
                .back()
                .is_some_and(|tail| request.priority > tail.priority);
            if !displaces_tail {
                self.dropped += 1;
                request.transition(RequestStatus::Dropped);
                return Enqueued::Dropped(request);
            }
            evicted = self.pending.pop_back().map(|mut tail| {
                tail.transition(RequestStatus::Dropped);
                tail
            });
            self.dropped += 1;
        }

        request.transition(RequestStatus::Enqueued);
        let index = self
            .pending
            .partition_point(|queued| queued.priority >= request.priority);
        self.pending.insert(index, request);

        Enqueued::Accepted {
            position: index as u32 + 1,
            evicted,
        }
    }

    pub fn dequeue(&mut self) -> Option<TtsRequest> {
        self.pending.pop_front()
    }

    /// Remove every pending request, returning them in queue order.
    pub fn clear(&mut self) -> Vec<TtsRequest> {
        self.pending
            .drain(..)
            .map(|mut request| {
                request.transition(RequestStatus::Dropped);
                request
            })
            .collect()
    }

    /// Change capacity. Shrinking below the current length evicts from the
    /// lowest-priority tail; evicted requests are returned.
    pub fn set_max_size(&mut self, max_size: u32) -> Vec<TtsRequest> {
        self.max_size = max_size;
        let mut evicted = Vec::new();
        while self.pending.len() > max_size as usize {
            if let Some(mut tail) = self.pending.pop_back() {
                tail.transition(RequestStatus::Dropped);
                self.dropped += 1;
                evicted.push(tail);
            }
        }
        evicted
    }

    /// The next `n` pending requests in dequeue order.
    pub fn preview(&self, n: usize) -> Vec<QueuedRequestDto> {
        self.pending
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, request)| QueuedRequestDto::from_request(request, i as u32 + 1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chatvox_core::{Priority, SpeakTrigger};

    use super::*;

    fn request(text: &str, priority: Priority) -> TtsRequest {
        TtsRequest::from_trigger(
            SpeakTrigger::chat("u", "user", text).with_priority(priority),
            text.to_string(),
            None,
        )
    }

    fn texts(queue: &mut RequestQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.dequeue()).map(|r| r.text).collect()
    }

    #[test]
    fn orders_by_priority_then_fifo() {
        let mut queue = RequestQueue::new(10);
        queue.enqueue(request("n1", Priority::Normal));
        queue.enqueue(request("h1", Priority::High));
        queue.enqueue(request("n2", Priority::Normal));
        queue.enqueue(request("e1", Priority::Elevated));
        queue.enqueue(request("h2", Priority::High));

        assert_eq!(texts(&mut queue), ["h1", "h2", "e1", "n1", "n2"]);
    }

    #[test]
    fn accepted_request_reports_position_and_status() {
        let mut queue = RequestQueue::new(10);
        queue.enqueue(request("a", Priority::Normal));
        let Enqueued::Accepted { position, evicted } =
            queue.enqueue(request("b", Priority::High))
        else {
            panic!("expected acceptance");
        };
        assert_eq!(position, 1);
        assert!(evicted.is_none());
        assert_eq!(queue.preview(1)[0].text, "b");
        assert_eq!(queue.dequeue().unwrap().status, RequestStatus::Enqueued);
    }

    #[test]
    fn full_queue_rejects_same_or_lower_priority() {
        let mut queue = RequestQueue::new(2);
        queue.enqueue(request("a", Priority::Elevated));
        queue.enqueue(request("b", Priority::Normal));

        let Enqueued::Dropped(rejected) = queue.enqueue(request("c", Priority::Normal)) else {
            panic!("expected drop");
        };
        assert_eq!(rejected.status, RequestStatus::Dropped);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn higher_priority_evicts_lowest_tail() {
        let mut queue = RequestQueue::new(3);
        queue.enqueue(request("n1", Priority::Normal));
        queue.enqueue(request("e1", Priority::Elevated));
        queue.enqueue(request("n2", Priority::Normal));

        let Enqueued::Accepted { position, evicted } =
            queue.enqueue(request("h1", Priority::High))
        else {
            panic!("expected acceptance");
        };
        assert_eq!(position, 1);
        let evicted = evicted.unwrap();
        assert_eq!(evicted.text, "n2");
        assert_eq!(evicted.status, RequestStatus::Dropped);
        assert_eq!(queue.len(), 3);
        assert_eq!(texts(&mut queue), ["h1", "e1", "n1"]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut queue = RequestQueue::new(4);
        let priorities = [Priority::Normal, Priority::High, Priority::Elevated];
        for i in 0..50 {
            queue.enqueue(request(&i.to_string(), priorities[i % 3]));
            assert!(queue.len() <= 4);
        }
        assert!(queue.dropped_count() > 0);
    }

    #[test]
    fn clear_returns_every_pending_request() {
        let mut queue = RequestQueue::new(5);
        for i in 0..3 {
            queue.enqueue(request(&i.to_string(), Priority::Normal));
        }
        let removed = queue.clear();
        assert_eq!(removed.len(), 3);
        assert!(removed.iter().all(|r| r.status == RequestStatus::Dropped));
        assert!(queue.is_empty());
    }

    #[test]
    fn shrinking_evicts_tail() {
        let mut queue = RequestQueue::new(5);
        queue.enqueue(request("n1", Priority::Normal));
        queue.enqueue(request("h1", Priority::High));
        queue.enqueue(request("n2", Priority::Normal));

        let evicted = queue.set_max_size(1);
        assert_eq!(
            evicted.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(),
            ["n2", "n1"]
        );
        assert_eq!(texts(&mut queue), ["h1"]);
    }
}
