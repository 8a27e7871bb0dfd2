//! Runs the monitoring loops against a scripted sensor on the std time driver.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_futures::block_on;
use embassy_futures::join::join;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::Timer;
use touch_gesture::dispatch::CallbackResult;
use touch_gesture::{CallbackError, ConditionedState, TouchButton};

const UNTOUCHED: i32 = 1000;
const TOUCHED: i32 = 3000;

fn finger_sensor(finger: &Cell<bool>) -> impl FnMut() -> i32 + '_ {
    move || if finger.get() { TOUCHED } else { UNTOUCHED }
}

async fn press(finger: &Cell<bool>, ms: u64) {
    finger.set(true);
    Timer::after_millis(ms).await;
    finger.set(false);
}

fn counter(count: &AtomicU32) -> impl FnMut() -> CallbackResult + Send + '_ {
    move || {
        count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
fn test_click_is_delivered() {
    let finger = Cell::new(false);
    let clicks = AtomicU32::new(0);
    let double_clicks = AtomicU32::new(0);
    let mut on_click = counter(&clicks);
    let mut on_double_click = counter(&double_clicks);

    let button = TouchButton::<NoopRawMutex, _>::new(finger_sensor(&finger));
    button.set_ema_factor(1.0);
    button.disable_double_click_detection();
    button.register_callback("click", &mut on_click).unwrap();
    button.register_callback("double_click", &mut on_double_click).unwrap();

    block_on(join(button.monitor(), async {
        Timer::after_millis(100).await;
        press(&finger, 200).await;
        Timer::after_millis(300).await;
        button.stop();
    }));

    assert_eq!(clicks.load(Ordering::Relaxed), 1);
    assert_eq!(double_clicks.load(Ordering::Relaxed), 0);
}

#[test]
fn test_double_click_is_delivered() {
    let finger = Cell::new(false);
    let clicks = AtomicU32::new(0);
    let double_clicks = AtomicU32::new(0);
    let mut on_click = counter(&clicks);
    let mut on_double_click = counter(&double_clicks);

    let button = TouchButton::<NoopRawMutex, _>::new(finger_sensor(&finger));
    button.set_ema_factor(1.0);
    button.set_double_click_delay(0.4);
    button.register_callback("click", &mut on_click).unwrap();
    button.register_callback("double_click", &mut on_double_click).unwrap();

    block_on(join(button.monitor(), async {
        Timer::after_millis(100).await;
        press(&finger, 100).await;
        Timer::after_millis(80).await;
        press(&finger, 100).await;
        Timer::after_millis(600).await;
        button.stop();
    }));

    assert_eq!(double_clicks.load(Ordering::Relaxed), 1);
    assert_eq!(clicks.load(Ordering::Relaxed), 0);
}

#[test]
fn test_long_press_repeats_holds() {
    let finger = Cell::new(false);
    let clicks = AtomicU32::new(0);
    let long_presses = AtomicU32::new(0);
    let holds = AtomicU32::new(0);
    let mut on_click = counter(&clicks);
    let mut on_long_press = counter(&long_presses);
    let mut on_hold = counter(&holds);

    let button = TouchButton::<NoopRawMutex, _>::new(finger_sensor(&finger));
    button.set_ema_factor(1.0);
    button.set_long_press_timeout(0.5);
    button.set_long_press_hold_interval(0.1);
    button.register_callback("click", &mut on_click).unwrap();
    button.register_callback("long_press", &mut on_long_press).unwrap();
    button.register_callback("long_press_hold", &mut on_hold).unwrap();

    block_on(join(button.monitor(), async {
        Timer::after_millis(100).await;
        press(&finger, 900).await;
        Timer::after_millis(500).await;
        button.stop();
    }));

    assert_eq!(long_presses.load(Ordering::Relaxed), 1);
    assert!(holds.load(Ordering::Relaxed) >= 2, "only {} hold events", holds.load(Ordering::Relaxed));
    assert_eq!(clicks.load(Ordering::Relaxed), 0);
}

#[test]
fn test_failing_callback_does_not_stop_monitoring() {
    let finger = Cell::new(false);
    let attempts = AtomicU32::new(0);
    let long_presses = AtomicU32::new(0);
    let mut on_click = || -> CallbackResult {
        attempts.fetch_add(1, Ordering::Relaxed);
        Err(CallbackError("click handler broken"))
    };
    let mut on_long_press = counter(&long_presses);

    let button = TouchButton::<NoopRawMutex, _>::new(finger_sensor(&finger));
    button.set_ema_factor(1.0);
    button.set_long_press_timeout(0.5);
    button.disable_double_click_detection();
    button.register_callback("click", &mut on_click).unwrap();
    button.register_callback("long_press", &mut on_long_press).unwrap();

    block_on(join(button.monitor(), async {
        Timer::after_millis(100).await;
        press(&finger, 150).await;
        Timer::after_millis(200).await;
        press(&finger, 150).await;
        Timer::after_millis(200).await;
        press(&finger, 800).await;
        Timer::after_millis(200).await;
        button.stop();
    }));

    assert_eq!(attempts.load(Ordering::Relaxed), 2);
    assert_eq!(long_presses.load(Ordering::Relaxed), 1);
}

#[test]
fn test_stop_before_monitor_returns() {
    let button = TouchButton::<NoopRawMutex, _>::new(|| UNTOUCHED);
    button.stop();
    block_on(button.monitor());
    assert_eq!(button.conditioned().smoothed, UNTOUCHED);
}

#[test]
fn test_calibrate_sets_baseline() {
    let readings = Cell::new(0);
    let button = TouchButton::<NoopRawMutex, _>::new(|| {
        readings.set(readings.get() + 1);
        // 1230, 1232, ... 1238
        1228 + 2 * readings.get()
    });

    block_on(button.calibrate());

    assert_eq!(readings.get(), 5);
    assert_eq!(button.conditioned(), ConditionedState { smoothed: 0, baseline: 1234 });
}
