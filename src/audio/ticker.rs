//! Periodic trigger that stands in for a hardware timer interrupt.
//!
//! [`ThreadTicker`] owns a dedicated OS thread that calls the attached
//! callback once per period.  [`Ticker::detach`] stops the thread **and joins
//! it**, so when `detach` returns no further callback can fire and every
//! write the callback made is visible to the caller.  That join is the
//! ownership handoff between the sampler and the dispatch loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Callback run on every tick.
pub type TickFn = Arc<dyn Fn() + Send + Sync>;

/// The periodic trigger could not be started.
#[derive(Debug, Error)]
#[error("failed to start sampler trigger: {0}")]
pub struct TickerError(#[from] std::io::Error);

// ---------------------------------------------------------------------------
// Ticker trait
// ---------------------------------------------------------------------------

/// Timer surface: schedule a periodic callback, cancel it.
pub trait Ticker: Send {
    /// Start calling `tick` every `period`.
    ///
    /// On error nothing is attached.
    fn attach(&mut self, period: Duration, tick: TickFn) -> Result<(), TickerError>;

    /// Stop calling the callback.
    ///
    /// Implementations must guarantee the callback is not running and will
    /// never run again once this returns.
    fn detach(&mut self);

    fn is_attached(&self) -> bool;
}

// ---------------------------------------------------------------------------
// ThreadTicker
// ---------------------------------------------------------------------------

/// [`Ticker`] backed by a deadline-paced OS thread.
///
/// Deadlines advance by exactly one period per tick, so a late wake-up is
/// followed by back-to-back ticks until the schedule catches up.
#[derive(Default)]
pub struct ThreadTicker {
    running: Option<Running>,
}

struct Running {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ThreadTicker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ticker for ThreadTicker {
    fn attach(&mut self, period: Duration, tick: TickFn) -> Result<(), TickerError> {
        if self.running.is_some() {
            log::warn!("ticker: attach while already attached, replacing schedule");
            self.detach();
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("sampler-tick".into())
            .spawn(move || {
                let mut deadline = Instant::now() + period;
                while !stop_thread.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < deadline {
                        std::thread::sleep(deadline - now);
                        continue;
                    }
                    tick();
                    deadline += period;
                }
            })?;

        self.running = Some(Running { stop, thread });
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop.store(true, Ordering::Release);
            if running.thread.join().is_err() {
                log::error!("ticker: sampler thread panicked");
            }
        }
    }

    fn is_attached(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        self.detach();
    }
}

// ---------------------------------------------------------------------------
// BurstTicker (test double)
// ---------------------------------------------------------------------------

/// Fires its callback `burst` times synchronously inside `attach`.
///
/// Lets cycle tests fill a buffer deterministically without real timing.
/// Attaches beyond `bursting_attaches` fire nothing.
#[cfg(test)]
pub struct BurstTicker {
    pub burst: usize,
    pub bursting_attaches: usize,
    pub attaches: Arc<std::sync::atomic::AtomicUsize>,
    attached: bool,
}

#[cfg(test)]
impl BurstTicker {
    pub fn new(burst: usize) -> Self {
        Self {
            burst,
            bursting_attaches: usize::MAX,
            attaches: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            attached: false,
        }
    }

    /// Burst only on the first `attaches` attaches.
    pub fn limited(burst: usize, attaches: usize) -> Self {
        Self {
            bursting_attaches: attaches,
            ..Self::new(burst)
        }
    }
}

#[cfg(test)]
impl Ticker for BurstTicker {
    fn attach(&mut self, _period: Duration, tick: TickFn) -> Result<(), TickerError> {
        let previous = self.attaches.fetch_add(1, Ordering::SeqCst);
        self.attached = true;
        if previous >= self.bursting_attaches {
            return Ok(());
        }
        for _ in 0..self.burst {
            tick();
        }
        Ok(())
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn is_attached(&self) -> bool {
        self.attached
    }
}

/// Ticker whose trigger never starts, like a thread spawn refused by the OS.
#[cfg(test)]
#[derive(Default)]
pub struct FailingTicker {
    pub attempts: Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl Ticker for FailingTicker {
    fn attach(&mut self, _period: Duration, _tick: TickFn) -> Result<(), TickerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TickerError(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "thread limit reached",
        )))
    }

    fn detach(&mut self) {}

    fn is_attached(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_tick() -> (TickFn, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_tick = Arc::clone(&count);
        let tick: TickFn = Arc::new(move || {
            count_tick.fetch_add(1, Ordering::SeqCst);
        });
        (tick, count)
    }

    #[test]
    fn thread_ticker_fires_repeatedly() {
        let (tick, count) = counting_tick();
        let mut ticker = ThreadTicker::new();

        ticker.attach(Duration::from_millis(1), tick).expect("attach");
        assert!(ticker.is_attached());

        let start = Instant::now();
        while count.load(Ordering::SeqCst) < 5 && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(1));
        }
        ticker.detach();

        assert!(count.load(Ordering::SeqCst) >= 5);
        assert!(!ticker.is_attached());
    }

    #[test]
    fn no_ticks_after_detach_returns() {
        let (tick, count) = counting_tick();
        let mut ticker = ThreadTicker::new();

        ticker.attach(Duration::from_micros(200), tick).expect("attach");
        std::thread::sleep(Duration::from_millis(20));
        ticker.detach();

        let frozen = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), frozen);
    }

    #[test]
    fn detach_without_attach_is_harmless() {
        let mut ticker = ThreadTicker::new();
        ticker.detach();
        assert!(!ticker.is_attached());
    }

    #[test]
    fn reattach_replaces_previous_schedule() {
        let (first, first_count) = counting_tick();
        let (second, second_count) = counting_tick();
        let mut ticker = ThreadTicker::new();

        ticker.attach(Duration::from_millis(1), first).expect("attach");
        ticker.attach(Duration::from_millis(1), second).expect("attach");
        let frozen = first_count.load(Ordering::SeqCst);

        std::thread::sleep(Duration::from_millis(20));
        ticker.detach();

        assert_eq!(first_count.load(Ordering::SeqCst), frozen);
        assert!(second_count.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn burst_ticker_fires_synchronously() {
        let (tick, count) = counting_tick();
        let mut ticker = BurstTicker::new(7);
        ticker.attach(Duration::from_secs(1), tick).expect("attach");
        assert_eq!(count.load(Ordering::SeqCst), 7);
        assert!(ticker.is_attached());
        ticker.detach();
        assert!(!ticker.is_attached());
    }
}
