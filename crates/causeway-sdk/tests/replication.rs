//! End-to-end replication through the actor runtime.

use causeway_sdk::prelude::*;
use causeway_sdk::ReplicaId;
use std::sync::Arc;
use std::time::Duration;

const TOPIC: &str = "chat";

struct Node {
    manager: ReplicatorManager<String>,
    chat: ReplicatorRef<String>,
    deliveries: Subscription<String>,
}

async fn node(
    name: &str,
    membership: &Arc<InMemoryMembership>,
    directory: &ReplicatorDirectory<String>,
) -> Node {
    let settings = ReplicatorSettings::builder()
        .resend_interval(Duration::from_millis(50))
        .retry_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let manager = ReplicatorManager::new(name, settings, membership.clone(), directory.clone());
    let chat = manager.replicator(TOPIC);
    let deliveries = chat.subscribe().await.unwrap();
    Node {
        manager,
        chat,
        deliveries,
    }
}

async fn cluster(
    names: &[&str],
) -> (Arc<InMemoryMembership>, ReplicatorDirectory<String>, Vec<Node>) {
    let membership = Arc::new(InMemoryMembership::new());
    let directory = ReplicatorDirectory::new();
    let mut nodes = Vec::new();
    for name in names {
        nodes.push(node(name, &membership, &directory).await);
    }
    for name in names {
        membership.join(Member::new(*name));
    }
    settle().await;
    (membership, directory, nodes)
}

/// Let every actor drain its mailbox.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn next(node: &mut Node) -> (ReplicaId, String) {
    let delivered = node.deliveries.recv().await.unwrap();
    (delivered.origin, delivered.versioned.value)
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_reaches_every_node_once() {
    let (_membership, _directory, mut nodes) = cluster(&["n0", "n1", "n2"]).await;

    nodes[0].chat.broadcast("hello".to_string()).unwrap();
    settle().await;

    for node in nodes.iter_mut() {
        assert_eq!(next(node).await, ("n0".into(), "hello".to_string()));
        assert!(node.deliveries.try_recv().is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn test_reply_is_delivered_after_its_cause() {
    let (_membership, _directory, mut nodes) = cluster(&["n0", "n1", "n2"]).await;

    nodes[0].chat.broadcast("question".to_string()).unwrap();
    assert_eq!(next(&mut nodes[1]).await.1, "question");
    nodes[1].chat.broadcast("answer".to_string()).unwrap();
    settle().await;

    for node in nodes.iter_mut() {
        assert_eq!(next(node).await.1, "question");
        assert_eq!(next(node).await.1, "answer");
    }
}

#[tokio::test(start_paused = true)]
async fn test_stable_versions_follow_deliveries() {
    let (_membership, _directory, mut nodes) = cluster(&["n0", "n1", "n2"]).await;

    nodes[0].chat.broadcast("a".to_string()).unwrap();
    assert_eq!(next(&mut nodes[1]).await.1, "a");
    nodes[1].chat.broadcast("b".to_string()).unwrap();
    settle().await;

    let first = VectorClock::from_entries([("n0", 1)]);
    let second = VectorClock::from_entries([("n0", 1), ("n1", 1)]);
    let stable = nodes[2]
        .chat
        .stable_versions(vec![first.clone(), second])
        .await
        .unwrap();
    assert_eq!(stable, vec![first]);
}

#[tokio::test(start_paused = true)]
async fn test_late_joiner_receives_new_broadcasts() {
    let (membership, directory, mut nodes) = cluster(&["n0", "n1"]).await;

    let mut late = node("n2", &membership, &directory).await;
    membership.join(Member::new("n2"));
    settle().await;

    nodes[1].chat.broadcast("welcome".to_string()).unwrap();
    settle().await;

    assert_eq!(next(&mut late).await, ("n1".into(), "welcome".to_string()));
    assert_eq!(next(&mut nodes[0]).await.1, "welcome");
}

#[tokio::test(start_paused = true)]
async fn test_stopped_peer_does_not_block_others() {
    let (_membership, _directory, mut nodes) = cluster(&["n0", "n1", "n2"]).await;

    nodes[2].manager.stop();
    settle().await;
    assert!(nodes[2].chat.is_stopped());

    nodes[0].chat.broadcast("still here".to_string()).unwrap();
    settle().await;
    assert_eq!(next(&mut nodes[1]).await.1, "still here");
}

#[tokio::test(start_paused = true)]
async fn test_dropped_subscription_is_released() {
    let (_membership, _directory, mut nodes) = cluster(&["n0", "n1"]).await;

    let extra = nodes[1].chat.subscribe().await.unwrap();
    drop(extra);
    settle().await;

    nodes[0].chat.broadcast("after drop".to_string()).unwrap();
    settle().await;
    assert_eq!(next(&mut nodes[1]).await.1, "after drop");
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribed_handle_receives_nothing_more() {
    let (_membership, _directory, mut nodes) = cluster(&["n0", "n1"]).await;

    let mut extra = nodes[1].chat.subscribe().await.unwrap();
    nodes[0].chat.broadcast("before".to_string()).unwrap();
    settle().await;
    assert_eq!(extra.recv().await.unwrap().versioned.value, "before");

    nodes[1].chat.unsubscribe(extra.handle()).await.unwrap();
    nodes[0].chat.broadcast("after".to_string()).unwrap();
    settle().await;

    assert_eq!(next(&mut nodes[1]).await.1, "before");
    assert_eq!(next(&mut nodes[1]).await.1, "after");
    assert!(extra.try_recv().is_none());
    assert!(!extra.handle().is_closed());
}
