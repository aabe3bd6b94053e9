//! The external driver that calls the engine on an interval.

use crate::clock::{Clock, Watermark};
use crate::config::PollConfig;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::state::PassReport;
use caes_model::{StoreAdapter, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Calls [`SyncEngine::sync`] every `interval` and advances the watermark.
///
/// The watermark starts at the clock's current time (or
/// [`PollConfig::start_at`]) and, after every complete pass, moves to the
/// time read at the start of that pass. A pass that could not read one of
/// the stores in full leaves it where it was, so the next pass covers the
/// same window again. It lives only in memory: a restarted process begins
/// again from "now".
pub struct PollLoop<P: StoreAdapter, S: StoreAdapter, C: Clock> {
    engine: SyncEngine<P, S>,
    config: PollConfig,
    clock: C,
    watermark: Watermark,
    stop: Arc<AtomicBool>,
}

impl<P: StoreAdapter, S: StoreAdapter, C: Clock> PollLoop<P, S, C> {
    /// Creates a loop around an engine.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn new(engine: SyncEngine<P, S>, config: PollConfig, clock: C) -> SyncResult<Self> {
        config.validate()?;
        let start = config.start_at.unwrap_or_else(|| clock.now());
        Ok(Self {
            engine,
            config,
            clock,
            watermark: Watermark::new(start),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A flag that makes [`PollLoop::run`] return once raised.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Current watermark.
    pub fn watermark(&self) -> Timestamp {
        self.watermark.get()
    }

    /// The engine being driven.
    pub fn engine(&self) -> &SyncEngine<P, S> {
        &self.engine
    }

    /// Runs a single pass from the current watermark.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start a pass.
    pub fn run_once(&mut self) -> SyncResult<PassReport> {
        let pass_start = self.clock.now();
        let report = self.engine.sync(self.watermark.get())?;
        if !report.complete {
            warn!(
                watermark = self.watermark.get(),
                "a store could not be read in full, retrying the same window next pass"
            );
        } else if let Err(e) = self.watermark.advance_to(pass_start) {
            warn!(error = %e, "clock went backwards, keeping watermark");
        }
        Ok(report)
    }

    /// Runs `passes` passes back to back, without sleeping.
    ///
    /// # Errors
    ///
    /// Returns the first error of a pass.
    pub fn run_passes(&mut self, passes: usize) -> SyncResult<Vec<PassReport>> {
        (0..passes).map(|_| self.run_once()).collect()
    }

    /// Polls until the stop flag is raised, then closes the engine.
    ///
    /// Returns the number of passes run.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start a pass.
    pub fn run(&mut self) -> SyncResult<u64> {
        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            since = self.watermark.get(),
            "starting poll loop"
        );

        let mut passes = 0;
        while !self.stopped() {
            self.run_once()?;
            passes += 1;
            self.sleep_interval();
        }

        info!(passes, "poll loop stopped");
        self.engine.close();
        Ok(passes)
    }

    /// Consumes the loop, returning the engine.
    pub fn into_engine(self) -> SyncEngine<P, S> {
        self.engine
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn sleep_interval(&self) {
        let deadline = Instant::now() + self.config.interval;
        loop {
            if self.stopped() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state::SyncState;
    use caes_model::{EchoSuppressionSet, PreparedRecord, WriteSummary};

    /// Holds nothing; optionally reports every read as cut short.
    #[derive(Default)]
    struct Quiet {
        echo: EchoSuppressionSet,
        failing: Option<Arc<AtomicBool>>,
    }

    impl StoreAdapter for Quiet {
        type Raw = PreparedRecord;

        fn name(&self) -> &str {
            "quiet"
        }

        fn latest_since(&self, _since: Timestamp) -> Box<dyn Iterator<Item = PreparedRecord> + '_> {
            Box::new(std::iter::empty())
        }

        fn last_read_complete(&self) -> bool {
            !self
                .failing
                .as_ref()
                .is_some_and(|failing| failing.load(Ordering::SeqCst))
        }

        fn prepare_for_writing(&self, raw: PreparedRecord) -> PreparedRecord {
            raw
        }

        fn write_batch(&mut self, _entries: Vec<PreparedRecord>) -> WriteSummary {
            WriteSummary::default()
        }

        fn echo_suppression(&self) -> &EchoSuppressionSet {
            &self.echo
        }

        fn flush(&mut self) {}

        fn close(&mut self) {}
    }

    fn poll_loop(clock: &ManualClock, config: PollConfig) -> PollLoop<Quiet, Quiet, ManualClock> {
        let engine = SyncEngine::new(Quiet::default(), Quiet::default());
        PollLoop::new(engine, config, clock.clone()).unwrap()
    }

    #[test]
    fn watermark_starts_now_and_follows_pass_start() {
        let clock = ManualClock::new(1_000);
        let mut poll = poll_loop(&clock, PollConfig::default());
        assert_eq!(poll.watermark(), 1_000);

        clock.advance(10);
        let report = poll.run_once().unwrap();
        assert_eq!(report.since, 1_000);
        assert_eq!(poll.watermark(), 1_010);

        clock.advance(10);
        let report = poll.run_once().unwrap();
        assert_eq!(report.since, 1_010);
    }

    #[test]
    fn configured_start_overrides_clock() {
        let clock = ManualClock::new(1_000);
        let poll = poll_loop(&clock, PollConfig::default().with_start_at(9));
        assert_eq!(poll.watermark(), 9);
    }

    #[test]
    fn watermark_survives_clock_regression() {
        let clock = ManualClock::new(1_000);
        let mut poll = poll_loop(&clock, PollConfig::default());
        clock.set(500);
        poll.run_once().unwrap();
        assert_eq!(poll.watermark(), 1_000);
    }

    #[test]
    fn incomplete_pass_holds_the_watermark() {
        let clock = ManualClock::new(1_000);
        let failing = Arc::new(AtomicBool::new(true));
        let primary = Quiet {
            failing: Some(Arc::clone(&failing)),
            ..Quiet::default()
        };
        let engine = SyncEngine::new(primary, Quiet::default());
        let mut poll = PollLoop::new(engine, PollConfig::default(), clock.clone()).unwrap();

        clock.advance(10);
        let report = poll.run_once().unwrap();
        assert!(!report.complete);
        assert_eq!(poll.watermark(), 1_000);

        failing.store(false, Ordering::SeqCst);
        clock.advance(10);
        let report = poll.run_once().unwrap();
        assert_eq!(report.since, 1_000);
        assert!(report.complete);
        assert_eq!(poll.watermark(), 1_020);
    }

    #[test]
    fn run_passes_runs_back_to_back() {
        let clock = ManualClock::new(0);
        let mut poll = poll_loop(&clock, PollConfig::default());
        let reports = poll.run_passes(3).unwrap();
        assert_eq!(reports.len(), 3);
        assert_eq!(poll.engine().stats().passes, 3);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let engine = SyncEngine::new(Quiet::default(), Quiet::default());
        let config = PollConfig::default().with_interval(Duration::ZERO);
        assert!(PollLoop::new(engine, config, ManualClock::new(0)).is_err());
    }

    #[test]
    fn raised_stop_flag_ends_run() {
        let clock = ManualClock::new(0);
        let mut poll = poll_loop(&clock, PollConfig::new(Duration::from_millis(20)));
        let stop = poll.stop_handle();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            stop.store(true, Ordering::SeqCst);
        });
        let passes = poll.run().unwrap();
        stopper.join().unwrap();

        assert!(passes >= 1);
        assert_eq!(poll.engine().state(), SyncState::Closed);
    }

    #[test]
    fn stop_before_run_does_nothing() {
        let clock = ManualClock::new(0);
        let mut poll = poll_loop(&clock, PollConfig::default());
        poll.stop_handle().store(true, Ordering::SeqCst);
        assert_eq!(poll.run().unwrap(), 0);
    }
}
