use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;

use crate::ring::SampleRing;
use crate::session::DeviceSession;
use crate::SdrError;

/// Consecutive timed-out reads tolerated before the device is declared
/// dead. Retries are immediate; this is the real-time path.
const MAX_READ_RETRIES: u32 = 5;

pub struct AcquisitionHandle {
    thread: JoinHandle<()>,
}

impl AcquisitionHandle {
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Start the acquisition thread: read blocks from the session and push
/// them into the ring until stop()/close() or a fatal device error.
///
/// A fatal error stops the session's streaming (leaving it `Open` for a
/// retry of start()) and is sent exactly once on `errors`.
pub fn spawn(
    session: DeviceSession,
    ring: SampleRing,
    errors: Sender<SdrError>,
    read_timeout: Duration,
) -> AcquisitionHandle {
    AcquisitionHandle {
        thread: thread::spawn(move || run(session, ring, errors, read_timeout)),
    }
}

fn run(session: DeviceSession, ring: SampleRing, errors: Sender<SdrError>, read_timeout: Duration) {
    let mut seq = 0u64;
    let mut timeouts = 0u32;
    loop {
        match session.read_block(read_timeout) {
            Ok(mut block) => {
                timeouts = 0;
                block.seq = seq;
                seq += 1;
                match ring.push(block) {
                    Ok(crate::ring::PushOutcome::DroppedOldest) => {
                        log::debug!("ring full, dropped oldest block");
                    }
                    Ok(crate::ring::PushOutcome::Accepted) => {}
                    // ring closed: ordinary shutdown
                    Err(_) => break,
                }
            }
            Err(SdrError::Timeout) => {
                timeouts += 1;
                if timeouts > MAX_READ_RETRIES {
                    fatal(
                        &session,
                        &errors,
                        SdrError::DeviceError(format!(
                            "no samples after {} consecutive read timeouts",
                            MAX_READ_RETRIES
                        )),
                    );
                    break;
                }
            }
            // stop() or close() was called; nothing to report
            Err(SdrError::NotStreaming) | Err(SdrError::Closed) => break,
            Err(err) => {
                fatal(&session, &errors, err);
                break;
            }
        }
    }
    log::debug!("acquisition loop exited after {} blocks", seq);
}

fn fatal(session: &DeviceSession, errors: &Sender<SdrError>, err: SdrError) {
    log::error!("acquisition halted: {}", err);
    let _ = session.stop();
    let _ = errors.send(err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceInfo, TunerDriver, TunerKind, DEFAULT_GAIN_TABLE};
    use crate::session::SessionState;
    use crossbeam::channel::unbounded;
    use std::collections::VecDeque;

    /// What the next read_sync calls should do.
    #[derive(Clone, Copy)]
    enum Step {
        Data,
        Timeout,
        Fail,
    }

    struct ScriptDriver {
        steps: VecDeque<Step>,
        /// behavior once the script runs out
        rest: Step,
    }

    impl ScriptDriver {
        fn boxed(steps: Vec<Step>, rest: Step) -> Box<dyn TunerDriver> {
            Box::new(ScriptDriver {
                steps: steps.into(),
                rest,
            })
        }
    }

    impl TunerDriver for ScriptDriver {
        fn info(&self) -> DeviceInfo {
            DeviceInfo {
                name: "Script".into(),
                serial: "00000001".into(),
                tuner: TunerKind::R820t,
            }
        }
        fn tuner_gains(&self) -> Vec<i32> {
            DEFAULT_GAIN_TABLE.to_vec()
        }
        fn set_center_freq(&mut self, _: u32) -> Result<(), SdrError> {
            Ok(())
        }
        fn set_sample_rate(&mut self, _: u32) -> Result<(), SdrError> {
            Ok(())
        }
        fn set_tuner_gain(&mut self, _: i32) -> Result<(), SdrError> {
            Ok(())
        }
        fn set_agc(&mut self, _: bool) -> Result<(), SdrError> {
            Ok(())
        }
        fn set_ppm_correction(&mut self, _: i32) -> Result<(), SdrError> {
            Ok(())
        }
        fn set_direct_sampling(&mut self, _: bool) -> Result<(), SdrError> {
            Ok(())
        }
        fn reset_buffer(&mut self) -> Result<(), SdrError> {
            Ok(())
        }
        fn read_sync(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, SdrError> {
            let step = self.steps.pop_front().unwrap_or(self.rest);
            match step {
                Step::Data => {
                    // pace like a device so the consumer keeps up
                    std::thread::sleep(Duration::from_millis(1));
                    buf.fill(1);
                    Ok(buf.len())
                }
                Step::Timeout => Err(SdrError::Timeout),
                Step::Fail => Err(SdrError::DeviceError("usb transfer failed".into())),
            }
        }
    }

    fn start_session(driver: Box<dyn TunerDriver>) -> DeviceSession {
        let session = DeviceSession::new(driver).unwrap();
        session.start().unwrap();
        session
    }

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn blocks_arrive_in_acquisition_order() {
        let session = start_session(ScriptDriver::boxed(vec![], Step::Data));
        let ring = SampleRing::new(64);
        let (tx, errors) = unbounded();
        let handle = spawn(session.clone(), ring.clone(), tx, TIMEOUT);

        let mut last = None;
        for _ in 0..3 {
            let block = ring.pop(Duration::from_secs(1)).unwrap();
            if let Some(prev) = last {
                assert!(block.seq > prev, "out of order: {} after {}", block.seq, prev);
            }
            last = Some(block.seq);
        }
        session.stop().unwrap();
        handle.join();
        assert!(errors.try_recv().is_err());
    }

    #[test]
    fn timeouts_are_retried_transparently() {
        let session = start_session(ScriptDriver::boxed(
            vec![Step::Timeout, Step::Timeout, Step::Data],
            Step::Data,
        ));
        let ring = SampleRing::new(64);
        let (tx, errors) = unbounded();
        let handle = spawn(session.clone(), ring.clone(), tx, TIMEOUT);

        // a block still arrives and no error is surfaced
        ring.pop(Duration::from_secs(1)).unwrap();
        session.stop().unwrap();
        handle.join();
        assert!(errors.try_recv().is_err());
    }

    #[test]
    fn device_error_halts_the_loop_and_surfaces_once() {
        let session = start_session(ScriptDriver::boxed(
            vec![Step::Data, Step::Fail],
            Step::Data,
        ));
        let ring = SampleRing::new(8);
        let (tx, errors) = unbounded();
        let handle = spawn(session.clone(), ring.clone(), tx, TIMEOUT);
        handle.join();

        // exactly one error, session back to Open, restart allowed
        assert!(matches!(errors.try_recv(), Ok(SdrError::DeviceError(_))));
        assert!(errors.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Open);
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Streaming);
    }

    #[test]
    fn persistent_timeouts_become_fatal() {
        let session = start_session(ScriptDriver::boxed(vec![], Step::Timeout));
        let ring = SampleRing::new(8);
        let (tx, errors) = unbounded();
        let handle = spawn(session.clone(), ring.clone(), tx, TIMEOUT);
        handle.join();

        assert!(matches!(errors.try_recv(), Ok(SdrError::DeviceError(_))));
        assert!(errors.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Open);
    }

    #[test]
    fn closed_ring_ends_the_loop_silently() {
        let session = start_session(ScriptDriver::boxed(vec![], Step::Data));
        let ring = SampleRing::new(4);
        ring.close();
        let (tx, errors) = unbounded();
        let handle = spawn(session.clone(), ring, tx, TIMEOUT);
        handle.join();
        assert!(errors.try_recv().is_err());
        // still streaming as far as the session is concerned
        assert_eq!(session.state(), SessionState::Streaming);
    }
}
