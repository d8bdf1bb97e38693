//! Background jobs. Each operation class owns one [`Slot`]; a second job of
//! the same class is rejected while the first is still running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0} is already running")]
pub struct Busy(pub &'static str);

#[derive(Debug, Clone)]
pub struct Slot {
    name: &'static str,
    in_flight: Arc<AtomicBool>,
}

impl Slot {
    pub fn new(name: &'static str) -> Self {
        Self { name, in_flight: Arc::new(AtomicBool::new(false)) }
    }

    pub fn try_acquire(&self) -> Result<SlotGuard, Busy> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SlotGuard { in_flight: self.in_flight.clone() })
            .map_err(|_| Busy(self.name))
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Frees the slot when dropped.
#[derive(Debug)]
pub struct SlotGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub enum Event<P, T> {
    Progress(P),
    Done(T),
}

/// Runs `job` on its own thread while holding `slot`. Progress reported
/// through the sender, and finally the job's result, arrive on the returned
/// receiver. The slot is released just before `Done` is sent.
pub fn spawn_job<P, T, F>(slot: &Slot, job: F) -> Result<Receiver<Event<P, T>>, Busy>
where
    P: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&Sender<Event<P, T>>) -> T + Send + 'static,
{
    let guard = slot.try_acquire()?;
    let (tx, rx) = channel();

    thread::spawn(move || {
        let result = job(&tx);
        drop(guard);
        let _ = tx.send(Event::Done(result));
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn guard_releases_on_drop() {
        let slot = Slot::new("installer");
        let guard = slot.try_acquire().unwrap();
        assert!(slot.is_busy());
        assert!(slot.try_acquire().is_err());
        drop(guard);
        assert!(!slot.is_busy());
        assert!(slot.try_acquire().is_ok());
    }

    #[test]
    fn second_job_rejected_while_first_runs() {
        let slot = Slot::new("resolver");
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let first = spawn_job(&slot, move |progress: &Sender<Event<u8, &'static str>>| {
            let _ = progress.send(Event::Progress(1));
            release_rx.recv().unwrap();
            "first"
        })
        .unwrap();

        match first.recv().unwrap() {
            Event::Progress(1) => {}
            other => panic!("unexpected {:?}", other),
        }

        let err = spawn_job(&slot, |_: &Sender<Event<u8, &'static str>>| "second").unwrap_err();
        assert_eq!(err.to_string(), "resolver is already running");

        release_tx.send(()).unwrap();
        match first.recv().unwrap() {
            Event::Done(value) => assert_eq!(value, "first"),
            other => panic!("unexpected {:?}", other),
        }

        let again = spawn_job(&slot, |_: &Sender<Event<u8, &'static str>>| "again").unwrap();
        assert!(matches!(again.recv().unwrap(), Event::Done("again")));
    }
}
