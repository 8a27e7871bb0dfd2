//! A touch channel run as two cooperative loops.
//!
//! The sampling loop reads the sensor at `sample_interval` and replaces the
//! shared [`ConditionedState`] under a lock. The classification loop polls
//! that state at the classifier's cadence and dispatches gestures to the
//! registered callbacks. Both loops are joined by [`TouchButton::monitor`].
//!
//! The raw mutex type `M` decides how the shared records are protected:
//! `NoopRawMutex` when everything runs on one executor, or
//! `CriticalSectionRawMutex` when setters are called from other contexts.
//! In the second case the button is `Sync` as long as the sensor is `Send`;
//! callbacks are always `Send`.

use core::cell::{Cell, RefCell};

use embassy_futures::join::join;
use embassy_futures::select::{select, Either};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use log::{info, warn};

use crate::classifier::Classifier;
use crate::conditioner::{calibration_baseline, CALIBRATION_INTERVAL, CALIBRATION_SAMPLES};
use crate::dispatch::Callback;
use crate::{
    detector, duration_from_secs_f32, factor_from_f32, CallbackTable, ConditionedState,
    Conditioner, Error, GestureEvent, TouchConfig, DEFAULT_TOUCH_CONFIG,
};

/// Source of raw readings for one channel
///
/// `read_raw` is called once per sampling tick and must return promptly.
pub trait Sensor {
    fn read_raw(&mut self) -> i32;
}

impl<F: FnMut() -> i32> Sensor for F {
    fn read_raw(&mut self) -> i32 {
        self()
    }
}

pub struct TouchButton<'a, M: RawMutex, S: Sensor> {
    sensor: Mutex<M, RefCell<S>>,
    config: Mutex<M, Cell<TouchConfig>>,
    state: Mutex<M, Cell<ConditionedState>>,
    callbacks: Mutex<M, RefCell<CallbackTable<'a>>>,
    stop: Signal<M, ()>,
}

impl<'a, M: RawMutex, S: Sensor> TouchButton<'a, M, S> {
    pub fn new(sensor: S) -> Self {
        Self::with_config(sensor, DEFAULT_TOUCH_CONFIG)
    }

    pub fn with_config(sensor: S, config: TouchConfig) -> Self {
        Self {
            sensor: Mutex::new(RefCell::new(sensor)),
            config: Mutex::new(Cell::new(config)),
            state: Mutex::new(Cell::new(ConditionedState::default())),
            callbacks: Mutex::new(RefCell::new(CallbackTable::new())),
            stop: Signal::new(),
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> TouchConfig {
        self.config.lock(|config| config.get())
    }

    fn update_config(&self, f: impl FnOnce(&mut TouchConfig)) {
        self.config.lock(|cell| {
            let mut config = cell.get();
            f(&mut config);
            cell.set(config);
        });
    }

    pub fn set_touch_threshold(&self, threshold: u32) {
        self.update_config(|c| c.touch_threshold = threshold);
    }

    pub fn set_ema_factor(&self, factor: f32) {
        self.update_config(|c| c.ema_factor = factor_from_f32(factor));
    }

    pub fn set_baseline_approximation_factor(&self, factor: f32) {
        self.update_config(|c| c.baseline_factor = factor_from_f32(factor));
    }

    pub fn set_double_click_delay(&self, secs: f32) {
        self.update_config(|c| c.double_click_delay = duration_from_secs_f32(secs));
    }

    pub fn set_long_press_timeout(&self, secs: f32) {
        self.update_config(|c| c.long_press_timeout = duration_from_secs_f32(secs));
    }

    pub fn set_long_press_hold_interval(&self, secs: f32) {
        self.update_config(|c| c.long_press_hold_interval = duration_from_secs_f32(secs));
    }

    pub fn set_baseline_reset_timeout(&self, secs: f32) {
        self.update_config(|c| c.baseline_reset_timeout = duration_from_secs_f32(secs));
    }

    pub fn set_double_click_enabled(&self, enabled: bool) {
        self.update_config(|c| c.double_click_enabled = enabled);
    }

    pub fn enable_double_click_detection(&self) {
        self.set_double_click_enabled(true);
    }

    /// Report clicks on release instead of waiting out the double-click window
    pub fn disable_double_click_detection(&self) {
        self.set_double_click_enabled(false);
    }

    pub fn set_debug(&self, debug: bool) {
        self.update_config(|c| c.debug = debug);
    }

    pub fn set_sample_interval(&self, interval: Duration) {
        self.update_config(|c| c.sample_interval = interval);
    }

    pub fn set_idle_poll_interval(&self, interval: Duration) {
        self.update_config(|c| c.idle_poll_interval = interval);
    }

    /// Latest completed conditioning update
    pub fn conditioned(&self) -> ConditionedState {
        self.state.lock(|state| state.get())
    }

    pub fn is_touching(&self) -> bool {
        detector::is_touching(&self.conditioned(), &self.config())
    }

    /// Forget the smoothed value and baseline; the next sample starts cold
    pub fn reset(&self) {
        self.state.lock(|state| state.set(ConditionedState::default()));
    }

    /// Register a callback by event name, replacing any previous one
    pub fn register_callback(&self, name: &str, callback: Callback<'a>) -> Result<(), Error> {
        let event = name.parse()?;
        self.register(event, callback)
    }

    pub fn register(&self, event: GestureEvent, callback: Callback<'a>) -> Result<(), Error> {
        self.with_callbacks(|table| table.register(event, callback))
    }

    pub fn unregister(&self, event: GestureEvent) -> Result<(), Error> {
        self.with_callbacks(|table| {
            table.unregister(event);
        })
    }

    fn with_callbacks<R>(&self, f: impl FnOnce(&mut CallbackTable<'a>) -> R) -> Result<R, Error> {
        self.callbacks.lock(|table| match table.try_borrow_mut() {
            Ok(mut table) => Ok(f(&mut table)),
            Err(_) => {
                warn!("callback table changed from inside a callback, ignored");
                Err(Error::Busy)
            }
        })
    }

    fn read_raw(&self) -> i32 {
        self.sensor.lock(|sensor| sensor.borrow_mut().read_raw())
    }

    /// Set the baseline to the mean of a few readings of the untouched sensor
    ///
    /// Meant to run once before [`monitor`](Self::monitor).
    pub async fn calibrate(&self) {
        let mut samples = [0i32; CALIBRATION_SAMPLES];
        for sample in samples.iter_mut() {
            *sample = self.read_raw();
            Timer::after(CALIBRATION_INTERVAL).await;
        }

        if let Some(baseline) = calibration_baseline(&samples) {
            self.state.lock(|cell| {
                let mut state = cell.get();
                state.baseline = baseline;
                cell.set(state);
            });
            info!("calibrated baseline: {}", baseline);
        }
    }

    /// Ask a running [`monitor`](Self::monitor) to return
    ///
    /// A request made while no monitor is running ends the next one at its
    /// first suspension point.
    pub fn stop(&self) {
        self.stop.signal(());
    }

    /// Run sampling and classification until [`stop`](Self::stop) is called
    pub async fn monitor(&self) {
        let loops = join(self.sampling_loop(), self.classification_loop());
        if let Either::Second(()) = select(loops, self.stop.wait()).await {
            info!("monitor stopped");
        }
    }

    async fn sampling_loop(&self) {
        let mut conditioner = Conditioner::new();
        loop {
            let config = self.config();
            let raw = self.read_raw();
            let now = Instant::now();
            self.state
                .lock(|state| state.set(conditioner.update(state.get(), raw, now, &config)));
            pause(config.sample_interval).await;
        }
    }

    async fn classification_loop(&self) {
        let mut classifier = Classifier::new();
        loop {
            pause(classifier.poll_interval(&self.config())).await;

            let config = self.config();
            let touching = detector::is_touching(&self.conditioned(), &config);
            for event in classifier.poll(Instant::now(), touching, &config) {
                // Failures are logged by the table and go no further
                self.with_callbacks(|table| table.dispatch(event, config.debug)).ok();
            }
        }
    }
}

/// Sleep for `interval`, or at least yield when it is zero so the other loop runs
async fn pause(interval: Duration) {
    if interval.as_ticks() == 0 {
        yield_now().await;
    } else {
        Timer::after(interval).await;
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::dispatch::{CallbackResult, Dispatched};
    use core::sync::atomic::{AtomicU32, Ordering};
    use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};

    #[test]
    fn test_setters() {
        let button = TouchButton::<NoopRawMutex, _>::new(|| 0);
        button.set_touch_threshold(42);
        button.set_double_click_delay(0.5);
        button.set_long_press_timeout(2.0);
        button.set_long_press_hold_interval(0.25);
        button.set_baseline_reset_timeout(-3.0);
        button.disable_double_click_detection();
        button.set_debug(true);
        button.set_sample_interval(Duration::from_millis(5));

        let config = button.config();
        assert_eq!(config.touch_threshold, 42);
        assert_eq!(config.double_click_delay, Duration::from_millis(500));
        assert_eq!(config.long_press_timeout, Duration::from_secs(2));
        assert_eq!(config.long_press_hold_interval, Duration::from_millis(250));
        assert_eq!(config.baseline_reset_timeout, Duration::from_ticks(0));
        assert!(!config.double_click_enabled);
        assert!(config.debug);
        assert_eq!(config.sample_interval, Duration::from_millis(5));
        assert_eq!(config.idle_poll_interval, DEFAULT_TOUCH_CONFIG.idle_poll_interval);

        button.enable_double_click_detection();
        assert!(button.config().double_click_enabled);
    }

    #[test]
    fn test_setters_are_idempotent() {
        let button = TouchButton::<NoopRawMutex, _>::new(|| 0);
        button.set_ema_factor(0.3);
        button.set_touch_threshold(120);
        let once = button.config();
        for _ in 0..5 {
            button.set_ema_factor(0.3);
            button.set_touch_threshold(120);
        }
        assert_eq!(button.config(), once);
    }

    #[test]
    fn test_register_callback_names() {
        let mut cb = || -> CallbackResult { Ok(()) };
        let mut other = || -> CallbackResult { Ok(()) };
        let button = TouchButton::<NoopRawMutex, _>::new(|| 0);
        assert_eq!(button.register_callback("lpr", &mut cb), Err(Error::InvalidEvent));
        assert_eq!(button.register_callback("long_press", &mut other), Ok(()));
    }

    #[test]
    fn test_reset_clears_state() {
        let button = TouchButton::<NoopRawMutex, _>::new(|| 0);
        button.state.lock(|s| s.set(ConditionedState { smoothed: 10, baseline: 5 }));
        button.reset();
        assert_eq!(button.conditioned(), ConditionedState::default());
        assert!(!button.is_touching());
    }

    #[test]
    fn test_critical_section_button_is_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<TouchButton<'static, CriticalSectionRawMutex, fn() -> i32>>();
    }

    #[test]
    fn test_shared_across_threads() {
        let clicks = AtomicU32::new(0);
        let mut on_click = || -> CallbackResult {
            clicks.fetch_add(1, Ordering::Relaxed);
            Ok(())
        };
        let button = TouchButton::<CriticalSectionRawMutex, _>::new(|| 0);

        std::thread::scope(|s| {
            s.spawn(|| {
                button.set_touch_threshold(77);
                button.register(GestureEvent::Click, &mut on_click).unwrap();
            });
        });

        assert_eq!(button.config().touch_threshold, 77);
        let dispatched = button.with_callbacks(|table| table.dispatch(GestureEvent::Click, false));
        assert_eq!(dispatched, Ok(Dispatched::Invoked));
        assert_eq!(clicks.load(Ordering::Relaxed), 1);
    }
}
