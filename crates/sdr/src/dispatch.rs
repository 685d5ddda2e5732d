use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;

use crate::ring::SampleRing;
use crate::{SampleBlock, SdrError};

pub struct DispatchHandle {
    thread: JoinHandle<()>,
}

impl DispatchHandle {
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Start the consumer thread: pop blocks from the ring and hand each one
/// to `handler` by value. Exactly one consumer per ring.
///
/// A panicking handler is caught at this boundary, reported on `errors`
/// as `HandlerPanic`, and dispatch keeps going; nothing ever propagates
/// back into the acquisition side. Pop timeouts just mean a quiet radio.
pub fn spawn<F>(
    ring: SampleRing,
    mut handler: F,
    errors: Sender<SdrError>,
    pop_timeout: Duration,
) -> DispatchHandle
where
    F: FnMut(SampleBlock) + Send + 'static,
{
    DispatchHandle {
        thread: thread::spawn(move || loop {
            match ring.pop(pop_timeout) {
                Ok(block) => {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| handler(block)));
                    if let Err(payload) = result {
                        let msg = panic_message(payload);
                        log::error!("consumer handler panicked: {}", msg);
                        let _ = errors.send(SdrError::HandlerPanic(msg));
                    }
                }
                Err(SdrError::Timeout) => continue,
                // ring closed and drained
                Err(_) => break,
            }
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::sync::mpsc;

    fn block(seq: u64) -> SampleBlock {
        SampleBlock {
            data: Vec::new(),
            seq,
        }
    }

    #[test]
    fn delivers_every_block_in_order() {
        let ring = SampleRing::new(8);
        for seq in 0..5 {
            ring.push(block(seq)).unwrap();
        }
        ring.close();

        let (tx, rx) = mpsc::channel();
        let (err_tx, errors) = unbounded();
        let handle = spawn(
            ring,
            move |b| {
                let _ = tx.send(b.seq);
            },
            err_tx,
            Duration::from_millis(50),
        );
        handle.join();

        let seen: Vec<u64> = rx.iter().collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(errors.try_recv().is_err());
    }

    #[test]
    fn handler_panic_is_reported_and_dispatch_continues() {
        let ring = SampleRing::new(8);
        for seq in 0..4 {
            ring.push(block(seq)).unwrap();
        }
        ring.close();

        let (tx, rx) = mpsc::channel();
        let (err_tx, errors) = unbounded();
        let handle = spawn(
            ring,
            move |b| {
                if b.seq == 1 {
                    panic!("bad consumer");
                }
                let _ = tx.send(b.seq);
            },
            err_tx,
            Duration::from_millis(50),
        );
        handle.join();

        let seen: Vec<u64> = rx.iter().collect();
        assert_eq!(seen, vec![0, 2, 3]);
        match errors.try_recv() {
            Ok(SdrError::HandlerPanic(msg)) => assert!(msg.contains("bad consumer")),
            other => panic!("expected HandlerPanic, got {:?}", other),
        }
        assert!(errors.try_recv().is_err());
    }

    #[test]
    fn pop_timeout_is_not_an_error() {
        let ring = SampleRing::new(2);
        let (err_tx, errors) = unbounded();
        let handle = spawn(ring.clone(), |_| {}, err_tx, Duration::from_millis(10));

        // let it idle through a few timeouts, then push one block
        std::thread::sleep(Duration::from_millis(50));
        ring.push(block(0)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        ring.close();
        handle.join();
        assert!(errors.try_recv().is_err());
    }
}
