use super::*;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use muster_channel_memory::MemoryChannel;
use muster_token::NodeIdentity;
use tokio::sync::Mutex;
use tokio::time::Instant;

const VALID_TOKEN: &str = "K1a2b3c4d5e6f7890123456789012345678901234";

fn token_for(cluster: &str, node: &str) -> ClusterToken {
    ClusterToken {
        cluster_name: cluster.to_string(),
        server_fqdn: format!("{node}.internal"),
        server_ip: "10.0.1.5".parse().unwrap(),
        server_url: "https://10.0.1.5:6443".parse().unwrap(),
        server_node: node.to_string(),
        is_primary: true,
        token: VALID_TOKEN.to_string(),
        export_time: "2026-08-30T12:00:00Z".parse().unwrap(),
        tag: cluster.to_string(),
    }
}

/// Channel handing back arbitrary raw payloads, for malformed-record
/// cases the real channels cannot produce.
#[derive(Clone, Debug, Default)]
struct RawChannel {
    payloads: Arc<Mutex<Vec<Bytes>>>,
}

#[async_trait]
impl PublicationChannel for RawChannel {
    type Error = muster_channel_memory::Error;

    async fn publish(&self, token: &ClusterToken) -> std::result::Result<(), Self::Error> {
        self.payloads.lock().await.push(token.to_json_bytes());
        Ok(())
    }

    async fn retract(&self, _identity: &NodeIdentity) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    async fn query(&self, _cluster_name: &str) -> std::result::Result<Vec<Bytes>, Self::Error> {
        Ok(self.payloads.lock().await.clone())
    }
}

#[tokio::test(start_paused = true)]
async fn collects_once_the_server_publishes() {
    let channel = MemoryChannel::new();
    let collector = Collector::new(channel.clone());

    // Server becomes ready and publishes at t=45s.
    let publisher = channel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(45)).await;
        publisher.publish(&token_for("prod", "server-1")).await.unwrap();
    });

    let start = Instant::now();
    let outcome = collector
        .collect(&CollectOptions::new("prod"))
        .await
        .unwrap();

    let CollectOutcome::Collected(token) = outcome else {
        panic!("expected a collected token");
    };
    assert_eq!(token.token, VALID_TOKEN);
    assert_eq!(token.server_url.as_str(), "https://10.0.1.5:6443/");
    // 5s polling picks the record up within one interval of publication.
    assert!(start.elapsed() <= Duration::from_secs(50));
}

#[tokio::test(start_paused = true)]
async fn timeout_is_respected_within_one_interval() {
    let collector = Collector::new(MemoryChannel::new());
    let mut options = CollectOptions::new("prod");
    options.timeout = Duration::from_secs(20);

    let start = Instant::now();
    let err = collector.collect(&options).await.unwrap_err();

    let Error::NoClusterInfo { attempts, waited, .. } = err;
    assert_eq!(attempts, 5);
    assert_eq!(waited, Duration::from_secs(20));
    assert!(start.elapsed() <= Duration::from_secs(25));
}

/// Channel whose query itself stalls, the way a full-subnet scan does
/// when every probe has to time out.
#[derive(Clone, Debug)]
struct SlowChannel {
    query_time: Duration,
}

#[async_trait]
impl PublicationChannel for SlowChannel {
    type Error = muster_channel_memory::Error;

    async fn publish(&self, _token: &ClusterToken) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    async fn retract(&self, _identity: &NodeIdentity) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    async fn query(&self, _cluster_name: &str) -> std::result::Result<Vec<Bytes>, Self::Error> {
        tokio::time::sleep(self.query_time).await;
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn slow_query_cannot_outlive_the_budget() {
    let collector = Collector::new(SlowChannel {
        query_time: Duration::from_secs(60),
    });
    let mut options = CollectOptions::new("prod");
    options.timeout = Duration::from_secs(20);

    let start = Instant::now();
    let err = collector.collect(&options).await.unwrap_err();

    // The in-flight query is cut off at the deadline, not awaited out.
    let Error::NoClusterInfo { waited, .. } = err;
    assert_eq!(waited, Duration::from_secs(20));
    assert_eq!(start.elapsed(), Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_is_nonfatal_when_token_not_required() {
    let collector = Collector::new(MemoryChannel::new());
    let mut options = CollectOptions::new("prod");
    options.timeout = Duration::from_secs(10);
    options.wait_for_token = false;

    let outcome = collector.collect(&options).await.unwrap();
    assert!(matches!(outcome, CollectOutcome::ProceedWithoutToken));
}

#[tokio::test(start_paused = true)]
async fn incomplete_payload_is_rejected_and_polling_continues() {
    let channel = RawChannel::default();
    // A record with no token field: structurally incomplete.
    channel.payloads.lock().await.push(Bytes::from_static(
        br#"{"cluster_name": "prod", "server_url": "https://10.0.1.5:6443"}"#,
    ));

    let collector = Collector::new(channel.clone());

    // A complete record appears later from another server.
    let publisher = channel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        publisher.publish(&token_for("prod", "server-2")).await.unwrap();
    });

    let outcome = collector
        .collect(&CollectOptions::new("prod"))
        .await
        .unwrap();
    let CollectOutcome::Collected(token) = outcome else {
        panic!("expected a collected token");
    };
    assert_eq!(token.server_node, "server-2");
}

#[tokio::test(start_paused = true)]
async fn any_of_multiple_ha_records_suffices() {
    let channel = MemoryChannel::new();
    channel.publish(&token_for("prod", "server-1")).await.unwrap();
    channel.publish(&token_for("prod", "server-2")).await.unwrap();

    let collector = Collector::new(channel);
    let outcome = collector
        .collect(&CollectOptions::new("prod"))
        .await
        .unwrap();

    let CollectOutcome::Collected(token) = outcome else {
        panic!("expected a collected token");
    };
    assert!(token.server_node == "server-1" || token.server_node == "server-2");
}

#[tokio::test(start_paused = true)]
async fn state_file_records_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("collection.json");

    let channel = MemoryChannel::new();
    channel.publish(&token_for("prod", "server-1")).await.unwrap();

    let collector = Collector::new(channel);
    let mut options = CollectOptions::new("prod");
    options.state_path = Some(state_path.clone());
    collector.collect(&options).await.unwrap();

    let state = CollectionState::read(&state_path).unwrap();
    assert!(state.token_collected);
    assert_eq!(state.cluster_name, "prod");
    assert_eq!(state.token.as_deref(), Some(VALID_TOKEN));
    assert!(state.error.is_none());

    // A failed run overwrites with a failure record.
    let empty = Collector::new(MemoryChannel::new());
    let mut options = CollectOptions::new("other");
    options.timeout = Duration::from_secs(5);
    options.state_path = Some(state_path.clone());
    let _ = empty.collect(&options).await;

    let state = CollectionState::read(&state_path).unwrap();
    assert!(!state.token_collected);
    assert!(state.error.is_some());
}
