use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use super::service::{ProxyHandle, ProxyService};
use crate::client::{PublisherClient, SubscriberClient};
use crate::config::{BrokerSettings, ServerSettings, Settings};
use crate::connection::Role;
use crate::transport::frame::{ControlFrame, SubscriptionAction};
use crate::utils::error::ProxyError;

async fn within<F: Future>(f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(3), f)
        .await
        .expect("timed out")
}

async fn start_proxy() -> ProxyHandle {
    ProxyService::start("127.0.0.1:0", "127.0.0.1:0", BrokerSettings::default())
        .await
        .expect("proxy failed to start")
}

fn url(addr: std::net::SocketAddr) -> String {
    format!("ws://{addr}")
}

async fn wait_for(proxy: &ProxyHandle, role: Role, expected: usize) {
    within(async {
        while proxy.engine().lock().registry().count(role) != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

async fn subscribed(publisher: &mut PublisherClient, pattern: &str) {
    let directive = within(publisher.next_directive()).await.unwrap();
    assert_eq!(directive, ControlFrame::subscribe(Bytes::copy_from_slice(pattern.as_bytes())));
}

#[tokio::test]
async fn test_prefix_routing_end_to_end() {
    let proxy = start_proxy().await;
    let mut publisher = PublisherClient::connect(&url(proxy.publisher_addr())).await.unwrap();
    wait_for(&proxy, Role::Publisher, 1).await;

    let mut news = SubscriberClient::connect(&url(proxy.subscriber_addr())).await.unwrap();
    let mut everything = SubscriberClient::connect(&url(proxy.subscriber_addr())).await.unwrap();
    news.subscribe(b"news").await.unwrap();
    subscribed(&mut publisher, "news").await;
    everything.subscribe(b"").await.unwrap();
    subscribed(&mut publisher, "").await;

    publisher.publish(b"news.sports", b"goal").await.unwrap();
    publisher.publish(b"weather", b"rain").await.unwrap();
    publisher.publish(b"news.tech", b"release").await.unwrap();

    let first = within(news.next_message()).await.unwrap().unwrap();
    assert_eq!(first.topic(), Bytes::from_static(b"news.sports"));
    assert_eq!(first.payload(), Bytes::from_static(b"goal"));
    // "weather" was never queued for this subscriber
    let second = within(news.next_message()).await.unwrap().unwrap();
    assert_eq!(second.topic(), Bytes::from_static(b"news.tech"));

    let mut topics = Vec::new();
    for _ in 0..3 {
        let msg = within(everything.next_message()).await.unwrap().unwrap();
        topics.push(msg.topic());
    }
    assert_eq!(topics, vec![
        Bytes::from_static(b"news.sports"),
        Bytes::from_static(b"weather"),
        Bytes::from_static(b"news.tech"),
    ]);

    let stats = proxy.stats();
    assert_eq!(stats.frames_forwarded, 5);
    assert_eq!(stats.directives_emitted, 2);

    proxy.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_unsubscribe_and_disconnect_reach_the_publisher() {
    let proxy = start_proxy().await;
    let mut publisher = PublisherClient::connect(&url(proxy.publisher_addr())).await.unwrap();
    wait_for(&proxy, Role::Publisher, 1).await;

    let mut subscriber = SubscriberClient::connect(&url(proxy.subscriber_addr())).await.unwrap();
    subscriber.subscribe(b"alpha").await.unwrap();
    subscribed(&mut publisher, "alpha").await;
    subscriber.subscribe(b"beta").await.unwrap();
    subscribed(&mut publisher, "beta").await;

    subscriber.unsubscribe(b"alpha").await.unwrap();
    let directive = within(publisher.next_directive()).await.unwrap();
    assert_eq!(directive.action, SubscriptionAction::Unsubscribe);
    assert_eq!(directive.pattern, Bytes::from_static(b"alpha"));

    subscriber.close().await.unwrap();
    let directive = within(publisher.next_directive()).await.unwrap();
    assert_eq!(directive, ControlFrame::unsubscribe(Bytes::from_static(b"beta")));
    assert!(proxy.engine().lock().table().is_empty());

    proxy.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_late_publisher_is_told_about_existing_patterns() {
    let proxy = start_proxy().await;
    let mut subscriber = SubscriberClient::connect(&url(proxy.subscriber_addr())).await.unwrap();
    subscriber.subscribe(b"a").await.unwrap();
    subscriber.subscribe(b"b").await.unwrap();
    within(async {
        while proxy.engine().lock().table().pattern_count() != 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    let mut publisher = PublisherClient::connect(&url(proxy.publisher_addr())).await.unwrap();
    let mut replayed = HashSet::new();
    for _ in 0..2 {
        let directive = within(publisher.next_directive()).await.unwrap();
        assert_eq!(directive.action, SubscriptionAction::Subscribe);
        replayed.insert(directive.pattern);
    }
    assert_eq!(
        replayed,
        HashSet::from([Bytes::from_static(b"a"), Bytes::from_static(b"b")])
    );

    // Replay does not count as a new directive.
    assert_eq!(proxy.stats().directives_emitted, 2);
    proxy.stop(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_bind_failure_is_a_fatal_startup_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let result = ProxyService::start(&addr, "127.0.0.1:0", BrokerSettings::default()).await;
    let Err(err) = result else {
        panic!("bind on a used address succeeded");
    };
    assert!(matches!(err, ProxyError::Startup { endpoint: "publisher", .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_start_from_settings_uses_configured_addresses() {
    let settings = Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            publisher_port: 0,
            subscriber_port: 0,
        },
        ..Settings::default()
    };
    let proxy = ProxyService::start_from_settings(&settings).await.unwrap();
    assert!(proxy.publisher_addr().ip().is_loopback());
    assert_ne!(proxy.publisher_addr().port(), 0);
    assert_ne!(proxy.publisher_addr(), proxy.subscriber_addr());
    proxy.stop(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_stop_drains_open_connections() {
    let proxy = start_proxy().await;
    let publisher_url = url(proxy.publisher_addr());
    let _publisher = PublisherClient::connect(&publisher_url).await.unwrap();
    let mut subscriber = SubscriberClient::connect(&url(proxy.subscriber_addr())).await.unwrap();
    wait_for(&proxy, Role::Publisher, 1).await;
    wait_for(&proxy, Role::Subscriber, 1).await;

    let engine = proxy.engine().clone();
    let report = proxy.stop(Duration::from_secs(2)).await;
    assert_eq!(report.drained, 2);
    assert_eq!(report.forced, 0);
    assert!(engine.lock().registry().is_empty());
    assert!(!engine.lock().registry().is_accepting());

    // The subscriber sees its stream end.
    let end = within(subscriber.next_message()).await;
    assert!(matches!(end, Ok(None) | Err(_)));

    assert!(PublisherClient::connect(&publisher_url).await.is_err());
}

#[tokio::test]
async fn test_two_proxies_in_one_process_are_independent() {
    let first = start_proxy().await;
    let second = start_proxy().await;
    assert_ne!(first.publisher_addr(), second.publisher_addr());

    let mut publisher = PublisherClient::connect(&url(first.publisher_addr())).await.unwrap();
    wait_for(&first, Role::Publisher, 1).await;
    let mut on_first = SubscriberClient::connect(&url(first.subscriber_addr())).await.unwrap();
    let mut on_second = SubscriberClient::connect(&url(second.subscriber_addr())).await.unwrap();
    on_first.subscribe(b"t").await.unwrap();
    on_second.subscribe(b"t").await.unwrap();
    subscribed(&mut publisher, "t").await;
    within(async {
        while second.engine().lock().table().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    publisher.publish(b"topic", b"only-first").await.unwrap();
    let msg = within(on_first.next_message()).await.unwrap().unwrap();
    assert_eq!(msg.payload(), Bytes::from_static(b"only-first"));

    assert_eq!(second.stats().frames_received, 1);
    assert_eq!(second.stats().frames_forwarded, 0);

    first.stop(Duration::from_secs(1)).await;
    second.stop(Duration::from_secs(1)).await;
}

const BIG_PAYLOAD: usize = 64 * 1024;

#[tokio::test]
async fn test_stop_forces_connections_that_cannot_flush() {
    let proxy = start_proxy().await;
    let mut publisher = PublisherClient::connect(&url(proxy.publisher_addr())).await.unwrap();
    wait_for(&proxy, Role::Publisher, 1).await;

    // Subscribes to everything and never reads.
    let mut stalled = SubscriberClient::connect(&url(proxy.subscriber_addr())).await.unwrap();
    stalled.subscribe(b"").await.unwrap();
    subscribed(&mut publisher, "").await;

    let payload = vec![0u8; BIG_PAYLOAD];
    for _ in 0..400 {
        publisher.publish(b"bulk", &payload).await.unwrap();
    }
    within(async {
        while proxy.stats().frames_forwarded < 400 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    let started = tokio::time::Instant::now();
    let report = proxy.stop(Duration::from_millis(300)).await;
    let elapsed = started.elapsed();

    assert!(report.forced >= 1, "{report:?}");
    assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
    // Well short of the 2s drain grace the stalled writer would otherwise get.
    assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
    drop(stalled);
}

#[tokio::test]
async fn test_slow_subscriber_is_evicted_while_others_keep_receiving() {
    const MESSAGES: usize = 400;
    let settings = BrokerSettings {
        queue_capacity: 16,
        max_overflows: 2,
        ..BrokerSettings::default()
    };
    let proxy = ProxyService::start("127.0.0.1:0", "127.0.0.1:0", settings)
        .await
        .unwrap();
    let mut publisher = PublisherClient::connect(&url(proxy.publisher_addr())).await.unwrap();
    wait_for(&proxy, Role::Publisher, 1).await;

    let mut slow = SubscriberClient::connect(&url(proxy.subscriber_addr())).await.unwrap();
    slow.subscribe(b"").await.unwrap();
    subscribed(&mut publisher, "").await;

    let mut fast = SubscriberClient::connect(&url(proxy.subscriber_addr())).await.unwrap();
    fast.subscribe(b"").await.unwrap();
    within(async {
        while proxy.engine().lock().table().subscriber_count(b"") != 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    let reader = tokio::spawn(async move {
        let mut received = 0;
        while received < MESSAGES {
            match fast.next_message().await {
                Ok(Some(_)) => received += 1,
                _ => break,
            }
        }
        received
    });

    let payload = vec![0u8; BIG_PAYLOAD];
    for _ in 0..MESSAGES {
        publisher.publish(b"bulk", &payload).await.unwrap();
    }

    let received = tokio::time::timeout(Duration::from_secs(10), reader)
        .await
        .expect("fast subscriber stalled")
        .unwrap();
    assert_eq!(received, MESSAGES);

    let stats = proxy.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(proxy.engine().lock().registry().count(Role::Subscriber), 1);
    // The pattern is still held by the fast subscriber, so nothing went upstream.
    assert_eq!(proxy.engine().lock().table().subscriber_count(b""), 1);

    drop(slow);
    proxy.stop(Duration::from_secs(1)).await;
}
