// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use super::*;

fn saved(id: &str) -> SyncEvent {
    SyncEvent::Saved {
        document_id: id.into(),
        version: 1,
    }
}

#[tokio::test]
async fn every_subscriber_sees_each_event() {
    let bus = EventBus::new();
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();

    bus.emit(saved("doc-1"));

    assert_eq!(a.recv().await, Some(saved("doc-1")));
    assert_eq!(b.recv().await, Some(saved("doc-1")));
}

#[tokio::test]
async fn emit_without_subscribers_is_harmless() {
    let bus = EventBus::new();
    bus.emit(saved("doc-1"));
    let mut late = bus.subscribe();
    assert_eq!(late.try_recv(), None);
}

#[test]
fn unsubscribe_releases_the_receiver() {
    let bus = EventBus::new();
    let sub = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 1);
    sub.unsubscribe();
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn lagging_subscriber_skips_to_recent_events() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe();
    for i in 0..(EVENT_CAPACITY + 10) {
        bus.emit(SyncEvent::Saved {
            document_id: "doc".into(),
            version: i as i64,
        });
    }

    match sub.recv().await {
        Some(SyncEvent::Saved { version, .. }) => assert_eq!(version, 10),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn recv_ends_when_bus_dropped() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe();
    drop(bus);
    assert_eq!(sub.recv().await, None);
}
