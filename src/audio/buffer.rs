use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::models::PcmBuffer;

/// Buffers that may wait in the queue before the producer has to back off
pub const QUEUE_CAPACITY: usize = 1024;

/// Counters shared by both ends of a playback queue
#[derive(Debug, Default)]
struct QueueCounters {
    appended: AtomicUsize,
    consumed: AtomicUsize,
}

/// Why a buffer was not queued
#[derive(Debug)]
pub enum AppendError {
    /// The queue is at capacity; the buffer is handed back for a retry
    Full(PcmBuffer),
    /// The consumer is gone or the session no longer accepts audio
    Closed,
}

/// Create a connected producer/consumer pair.
///
/// The producer lives with the network/decode task, the consumer with the
/// mixer. Buffers travel in append order; a buffer is never touched by the
/// producer again once appended. Played buffers travel back to the producer
/// so they are freed off the audio thread.
pub fn playback_queue() -> (QueueProducer, PlaybackQueue) {
    playback_queue_with_capacity(QUEUE_CAPACITY)
}

pub fn playback_queue_with_capacity(capacity: usize) -> (QueueProducer, PlaybackQueue) {
    let capacity = capacity.max(1);
    // Array channels allocate every slot up front, so neither end allocates
    // or frees channel memory while audio is flowing.
    let (tx, rx) = bounded(capacity);
    // Room for every queued buffer plus the one being played.
    let (recycle_tx, recycle_rx) = bounded(capacity + 1);
    let counters = Arc::new(QueueCounters::default());
    (
        QueueProducer {
            tx,
            returned: recycle_rx,
            counters: Arc::clone(&counters),
        },
        PlaybackQueue {
            rx,
            recycle: recycle_tx,
            current: None,
            current_buffer_index: 0,
            samples_consumed_in_current: 0,
            counters,
        },
    )
}

/// Append side of the queue
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: Sender<PcmBuffer>,
    returned: Receiver<PcmBuffer>,
    counters: Arc<QueueCounters>,
}

impl QueueProducer {
    /// Queue a decoded buffer behind everything appended before it, without
    /// waiting
    pub fn try_append(&self, buffer: PcmBuffer) -> Result<(), AppendError> {
        self.reclaim();
        match self.tx.try_send(buffer) {
            Ok(()) => {
                self.counters.appended.fetch_add(1, Ordering::Release);
                Ok(())
            }
            Err(TrySendError::Full(buffer)) => Err(AppendError::Full(buffer)),
            Err(TrySendError::Disconnected(_)) => Err(AppendError::Closed),
        }
    }

    /// Like [`QueueProducer::try_append`], dropping the buffer when it cannot
    /// be queued. Returns false in that case.
    pub fn append(&self, buffer: PcmBuffer) -> bool {
        self.try_append(buffer).is_ok()
    }

    /// Free buffers the mixer has finished with; returns how many
    pub fn reclaim(&self) -> usize {
        self.returned.try_iter().count()
    }

    /// Buffers appended so far, including empty ones
    pub fn appended(&self) -> usize {
        self.counters.appended.load(Ordering::Acquire)
    }

    pub fn consumed(&self) -> usize {
        self.counters.consumed.load(Ordering::Acquire)
    }
}

/// Consumer side: the ordered buffers plus the playback cursor.
///
/// `next_sample` never blocks, allocates or frees.
#[derive(Debug)]
pub struct PlaybackQueue {
    rx: Receiver<PcmBuffer>,
    recycle: Sender<PcmBuffer>,
    current: Option<PcmBuffer>,
    current_buffer_index: usize,
    samples_consumed_in_current: usize,
    counters: Arc<QueueCounters>,
}

impl PlaybackQueue {
    /// Next sample in append order, or `None` when everything appended so far
    /// has been played
    pub fn next_sample(&mut self) -> Option<f32> {
        loop {
            if let Some(buffer) = &self.current {
                if let Some(&sample) = buffer.samples().get(self.samples_consumed_in_current) {
                    self.samples_consumed_in_current += 1;
                    if self.samples_consumed_in_current == buffer.len() {
                        self.retire_current();
                    }
                    return Some(sample);
                }
                // zero-length buffer
                self.retire_current();
            }

            match self.rx.try_recv() {
                Ok(buffer) => {
                    self.current = Some(buffer);
                    self.samples_consumed_in_current = 0;
                }
                Err(_) => return None,
            }
        }
    }

    /// Index of the buffer being played; only ever increases
    pub fn current_buffer_index(&self) -> usize {
        self.current_buffer_index
    }

    pub fn samples_consumed_in_current(&self) -> usize {
        self.samples_consumed_in_current
    }

    /// Buffers appended but not yet started
    pub fn pending_buffers(&self) -> usize {
        self.rx.len()
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            appended: self.counters.appended.load(Ordering::Acquire),
            consumed: self.counters.consumed.load(Ordering::Acquire),
            pending_buffers: self.pending_buffers(),
            current_buffer_index: self.current_buffer_index,
            samples_consumed_in_current: self.samples_consumed_in_current,
        }
    }

    fn retire_current(&mut self) {
        if let Some(buffer) = self.current.take() {
            // Only fails once the producer is gone, i.e. during teardown.
            let _ = self.recycle.try_send(buffer);
        }
        self.samples_consumed_in_current = 0;
        self.current_buffer_index += 1;
        self.counters.consumed.fetch_add(1, Ordering::Release);
    }
}

/// Queue position information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub appended: usize,
    pub consumed: usize,
    pub pending_buffers: usize,
    pub current_buffer_index: usize,
    pub samples_consumed_in_current: usize,
}

impl QueueStatus {
    /// True when every appended buffer has been played out
    pub fn is_drained(&self) -> bool {
        self.consumed == self.appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn buffer(samples: &[f32]) -> PcmBuffer {
        PcmBuffer::new(samples.to_vec(), 48_000)
    }

    fn drain(queue: &mut PlaybackQueue) -> Vec<f32> {
        std::iter::from_fn(|| queue.next_sample()).collect()
    }

    #[test]
    fn test_empty_queue_yields_none() {
        let (_producer, mut queue) = playback_queue();
        assert_eq!(queue.next_sample(), None);
        assert_eq!(queue.current_buffer_index(), 0);
    }

    #[test]
    fn test_buffers_play_in_append_order() {
        let (producer, mut queue) = playback_queue();
        producer.append(buffer(&[0.1, 0.2, 0.3]));
        producer.append(buffer(&[0.4]));
        producer.append(buffer(&[0.5, 0.6]));

        assert_eq!(drain(&mut queue), vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(queue.current_buffer_index(), 3);
        assert!(queue.status().is_drained());
        assert_eq!(producer.consumed(), 3);
    }

    #[test]
    fn test_zero_length_buffers_are_skipped() {
        let (producer, mut queue) = playback_queue();
        producer.append(buffer(&[0.25]));
        producer.append(buffer(&[]));
        producer.append(buffer(&[]));
        producer.append(buffer(&[-0.25]));

        assert_eq!(drain(&mut queue), vec![0.25, -0.25]);
        assert_eq!(queue.current_buffer_index(), 4);
        assert_eq!(producer.appended(), 4);
    }

    #[test]
    fn test_resumes_after_running_dry() {
        let (producer, mut queue) = playback_queue();
        producer.append(buffer(&[1.0, 0.5]));
        assert_eq!(queue.next_sample(), Some(1.0));
        assert_eq!(queue.samples_consumed_in_current(), 1);
        assert_eq!(queue.next_sample(), Some(0.5));
        assert_eq!(queue.next_sample(), None);

        producer.append(buffer(&[0.75]));
        assert_eq!(queue.next_sample(), Some(0.75));
        assert_eq!(queue.next_sample(), None);
        assert_eq!(queue.current_buffer_index(), 2);
    }

    #[test]
    fn test_cursor_index_is_monotonic() {
        let (producer, mut queue) = playback_queue();
        for i in 0..10 {
            producer.append(buffer(&vec![i as f32 / 10.0; i % 3]));
        }
        let mut last = queue.current_buffer_index();
        while queue.next_sample().is_some() {
            assert!(queue.current_buffer_index() >= last);
            last = queue.current_buffer_index();
        }
        assert_eq!(queue.current_buffer_index(), 10);
    }

    #[test]
    fn test_played_buffers_return_to_producer() {
        let (producer, mut queue) = playback_queue();
        producer.append(buffer(&[0.1, 0.2]));
        producer.append(buffer(&[]));
        producer.append(buffer(&[0.3]));

        assert_eq!(queue.next_sample(), Some(0.1));
        // The first buffer is still playing
        assert_eq!(producer.reclaim(), 0);

        assert_eq!(drain(&mut queue), vec![0.2, 0.3]);
        assert_eq!(producer.reclaim(), 3);
        assert_eq!(producer.reclaim(), 0);
    }

    #[test]
    fn test_full_queue_hands_buffer_back() {
        let (producer, mut queue) = playback_queue_with_capacity(2);
        assert!(producer.try_append(buffer(&[0.1])).is_ok());
        assert!(producer.try_append(buffer(&[0.2])).is_ok());

        match producer.try_append(buffer(&[0.3])) {
            Err(AppendError::Full(returned)) => {
                assert_eq!(returned.samples().to_vec(), vec![0.3f32]);
                assert_eq!(producer.appended(), 2);

                assert_eq!(queue.next_sample(), Some(0.1));
                assert!(producer.try_append(returned).is_ok());
            }
            other => panic!("Expected Full, got {:?}", other),
        }
        assert_eq!(drain(&mut queue), vec![0.2, 0.3]);
    }

    #[test]
    fn test_recycle_channel_never_overflows() {
        // Everything appended in one go, then played with no further appends.
        let (producer, mut queue) = playback_queue_with_capacity(4);
        for i in 0..4 {
            assert!(producer.append(buffer(&[i as f32])));
        }
        assert_eq!(drain(&mut queue).len(), 4);
        assert_eq!(producer.reclaim(), 4);
    }

    #[test]
    fn test_append_fails_once_consumer_dropped() {
        let (producer, queue) = playback_queue();
        drop(queue);
        assert!(!producer.append(buffer(&[0.0])));
        assert!(matches!(producer.try_append(buffer(&[0.0])), Err(AppendError::Closed)));
        assert_eq!(producer.appended(), 0);
    }

    #[test]
    fn test_producer_and_consumer_on_separate_threads() {
        let (producer, mut queue) = playback_queue();
        let total_buffers = 200;

        let writer = thread::spawn(move || {
            for i in 0..total_buffers {
                producer.append(buffer(&[i as f32, i as f32]));
                if i % 16 == 0 {
                    thread::yield_now();
                }
            }
        });

        let mut received = Vec::new();
        while received.len() < total_buffers * 2 {
            match queue.next_sample() {
                Some(sample) => received.push(sample),
                None => thread::yield_now(),
            }
        }
        writer.join().unwrap();

        let expected: Vec<f32> = (0..total_buffers).flat_map(|i| [i as f32, i as f32]).collect();
        assert_eq!(received, expected);
    }
}
