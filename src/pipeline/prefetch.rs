use crossbeam::channel::{bounded, Receiver};
use std::thread::{self, JoinHandle};

/// Runs `inner` on a producer thread, keeping at most `depth` items ready ahead of the
/// consumer. Dropping the iterator stops the producer at its next send.
pub struct Prefetcher<T: Send + 'static> {
    receiver: Receiver<T>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Prefetcher<T> {
    pub fn spawn<I>(inner: I, depth: usize) -> Self
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        let (sender, receiver) = bounded(depth.max(1));
        let handle = thread::spawn(move || {
            for item in inner {
                if sender.send(item).is_err() {
                    break;
                }
            }
        });

        Self {
            receiver,
            handle: Some(handle),
        }
    }
}

impl<T: Send + 'static> Iterator for Prefetcher<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self.receiver.recv() {
            Ok(item) => Some(item),
            Err(_) => {
                // Producer finished and the channel is drained; a producer panic is
                // re-raised here instead of ending the stream early
                if let Some(handle) = self.handle.take() {
                    if let Err(payload) = handle.join() {
                        std::panic::resume_unwind(payload);
                    }
                }
                None
            }
        }
    }
}
