//! Host-to-guest input queue.
//!
//! A single logical FIFO shared by every caller thread (producers) and the
//! engine thread (sole consumer). Capacity is unbounded: a producer never
//! waits on engine progress, at the cost of unbounded memory growth if the
//! engine stops draining while callers keep writing.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// One unit of host input, consumed in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputEvent {
    /// Raw bytes for the guest console.
    Data(Vec<u8>),
    /// Host console geometry changed.
    Resize {
        /// Visible columns.
        columns: u16,
        /// Visible rows.
        rows: u16,
    },
}

/// Result of polling the input queue from the engine thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPoll {
    /// Next event in FIFO order.
    Event(InputEvent),
    /// No event is pending right now.
    Empty,
    /// The host closed the queue; no further events will arrive.
    Closed,
}

/// Producer half held by the session controller.
#[derive(Debug, Clone)]
pub struct InputSender {
    tx: Sender<InputEvent>,
}

/// Consumer half handed to the engine run loop.
#[derive(Debug)]
pub struct InputReceiver {
    rx: Receiver<InputEvent>,
}

/// Creates a connected input queue pair.
#[must_use]
pub fn input_queue() -> (InputSender, InputReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (InputSender { tx }, InputReceiver { rx })
}

impl InputSender {
    /// Appends an event. Returns `false` when the consumer is gone.
    pub fn send(&self, event: InputEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Number of events not yet taken by the engine.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

impl InputReceiver {
    /// Takes the next pending event without blocking.
    #[must_use]
    pub fn try_next(&self) -> InputPoll {
        match self.rx.try_recv() {
            Ok(event) => InputPoll::Event(event),
            Err(TryRecvError::Empty) => InputPoll::Empty,
            Err(TryRecvError::Disconnected) => InputPoll::Closed,
        }
    }

    /// Waits up to `timeout` for the next event.
    #[must_use]
    pub fn next_timeout(&self, timeout: Duration) -> InputPoll {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => InputPoll::Event(event),
            Err(RecvTimeoutError::Timeout) => InputPoll::Empty,
            Err(RecvTimeoutError::Disconnected) => InputPoll::Closed,
        }
    }

    /// Drains every event pending right now, in FIFO order.
    pub fn drain(&self) -> impl Iterator<Item = InputEvent> + '_ {
        self.rx.try_iter()
    }

    /// Number of events waiting to be consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` when no event is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::{input_queue, InputEvent, InputPoll};

    #[test]
    fn empty_queue_polls_empty_until_sender_dropped() {
        let (tx, rx) = input_queue();
        assert_eq!(rx.try_next(), InputPoll::Empty);
        assert_eq!(rx.next_timeout(Duration::from_millis(1)), InputPoll::Empty);
        assert!(rx.is_empty());

        drop(tx);
        assert_eq!(rx.try_next(), InputPoll::Closed);
        assert_eq!(rx.next_timeout(Duration::from_millis(1)), InputPoll::Closed);
    }

    #[test]
    fn pending_events_survive_sender_drop() {
        let (tx, rx) = input_queue();
        assert!(tx.send(InputEvent::Data(vec![1])));
        assert!(tx.send(InputEvent::Resize { columns: 80, rows: 24 }));
        assert_eq!(tx.pending(), 2);
        drop(tx);

        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_next(), InputPoll::Event(InputEvent::Data(vec![1])));
        assert_eq!(
            rx.try_next(),
            InputPoll::Event(InputEvent::Resize { columns: 80, rows: 24 })
        );
        assert_eq!(rx.try_next(), InputPoll::Closed);
    }

    #[test]
    fn send_reports_dropped_consumer() {
        let (tx, rx) = input_queue();
        drop(rx);
        assert!(!tx.send(InputEvent::Data(b"lost".to_vec())));
    }

    #[test]
    fn producers_on_many_threads_share_one_queue() {
        let (tx, rx) = input_queue();
        let handles: Vec<_> = (0..4u8)
            .map(|id| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for seq in 0..16u8 {
                        assert!(tx.send(InputEvent::Data(vec![id, seq])));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("producer thread");
        }

        let mut per_producer = [0u8; 4];
        for event in rx.drain() {
            let InputEvent::Data(bytes) = event else {
                panic!("unexpected event");
            };
            let id = usize::from(bytes[0]);
            assert_eq!(bytes[1], per_producer[id], "per-producer order preserved");
            per_producer[id] += 1;
        }
        assert_eq!(per_producer, [16; 4]);
    }

    proptest! {
        #[test]
        fn drain_yields_submission_order(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..8), 0..32)) {
            let (tx, rx) = input_queue();
            for chunk in &chunks {
                prop_assert!(tx.send(InputEvent::Data(chunk.clone())));
            }
            let drained: Vec<_> = rx.drain().collect();
            let expected: Vec<_> = chunks.into_iter().map(InputEvent::Data).collect();
            prop_assert_eq!(drained, expected);
        }
    }
}
