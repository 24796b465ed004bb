//! State poller tests.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::sleep;

use bravia_control::{ButtonConfig, EventFilter, StateProperty, StateValue};
use common::{harness, test_config};

fn config_with_sliders() -> bravia_control::DeviceConfig {
    test_config()
        .with_button(ButtonConfig::new("Volume", "V"))
        .with_button(ButtonConfig::new("Channel", "C"))
}

#[tokio::test(start_paused = true)]
async fn test_poll_once_refreshes_every_control() {
    let h = harness(config_with_sliders());

    let report = h.tv.poller().poll_once().await;

    assert!(report.powered);
    assert_eq!(report.failed, 0);
    assert_eq!(report.polled, 4);

    let volume = h.tv.events().latest("Den", StateProperty::Volume).await.unwrap();
    assert_eq!(volume.value, StateValue::Level(20));
    let channel = h.tv.events().latest("Den", StateProperty::Channel).await.unwrap();
    assert_eq!(channel.value, StateValue::Level(5));
}

#[tokio::test(start_paused = true)]
async fn test_poll_skips_controls_when_off() {
    let h = harness(config_with_sliders());
    h.rpc.power.store(false, Ordering::SeqCst);

    let report = h.tv.poller().poll_once().await;

    assert!(!report.powered);
    assert_eq!(report.polled, 1);
    assert!(h.rpc.calls_to("getVolumeInformation").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_failure_is_counted_not_fatal() {
    let h = harness(config_with_sliders());
    h.rpc.unreachable.store(true, Ordering::SeqCst);

    let report = h.tv.poller().poll_once().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.polled, 0);
}

#[tokio::test(start_paused = true)]
async fn test_poller_start_stop() {
    let h = harness(config_with_sliders());
    let poller = h.tv.poller();
    let mut power_events =
        h.tv.subscribe_filtered(EventFilter::new().property(StateProperty::Power));

    assert!(!poller.is_running().await);
    poller.start().await;
    assert!(poller.is_running().await);

    // First tick fires immediately, the second after the interval.
    let first = power_events.recv().await.unwrap();
    assert_eq!(first.flag(), Some(true));
    sleep(Duration::from_secs(31)).await;
    assert!(h.rpc.calls_to("getPowerStatus").len() >= 2);

    poller.stop().await;
    assert!(!poller.is_running().await);

    let polled = h.rpc.calls_to("getPowerStatus").len();
    sleep(Duration::from_secs(120)).await;
    assert_eq!(h.rpc.calls_to("getPowerStatus").len(), polled);
}
