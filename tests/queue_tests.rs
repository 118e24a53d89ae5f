use rs2_flow::queue::{BoundedQueue, TrySendError};
use rs2_flow::{FlowError, QueueCapacity};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_ok, assert_pending, assert_ready};

#[tokio::test]
async fn test_bounded_queue_basic() {
    let queue = BoundedQueue::bounded(2);
    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();

    assert!(sender.send(1).await.is_ok());
    assert!(sender.send(2).await.is_ok());

    // Full now
    assert!(matches!(sender.try_send(3), Err(TrySendError::Full(3))));

    assert_eq!(receiver.recv().await, Some(1));
    assert_eq!(receiver.recv().await, Some(2));

    // Space again
    assert!(sender.send(3).await.is_ok());
    assert_eq!(receiver.recv().await, Some(3));
}

#[tokio::test]
async fn test_dropping_sender_drains_remaining() {
    let queue = BoundedQueue::bounded(5);
    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();

    sender.send(1).await.unwrap();
    sender.send(2).await.unwrap();
    drop(sender);
    assert!(queue.is_closed());

    // Existing items are still delivered, then the queue ends
    assert_eq!(receiver.recv().await, Some(1));
    assert_eq!(receiver.recv().await, Some(2));
    assert_eq!(receiver.recv().await, None);
}

#[tokio::test]
async fn test_send_fails_after_receiver_closed() {
    let queue = BoundedQueue::bounded(1);
    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();

    receiver.close();
    assert!(sender.is_closed());
    assert_eq!(sender.send(1).await, Err(FlowError::Closed));
    assert!(matches!(sender.try_send(2), Err(TrySendError::Closed(2))));
}

#[tokio::test]
async fn test_receiver_close_wakes_suspended_sender() {
    let queue = BoundedQueue::bounded(1);
    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();
    sender.send(1).await.unwrap();

    let blocked = tokio::spawn(async move { sender.send(2).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());

    receiver.close();
    let result = tokio::time::timeout(Duration::from_secs(1), blocked)
        .await
        .expect("sender should be woken")
        .unwrap();
    assert_eq!(result, Err(FlowError::Closed));
}

#[tokio::test]
async fn test_queue_stats() {
    let queue = BoundedQueue::bounded(10);
    let sender = queue.take_sender().unwrap();

    sender.send(1).await.unwrap();
    sender.send(2).await.unwrap();

    let stats = queue.stats();
    assert_eq!(stats.length, 2);
    assert_eq!(stats.capacity, Some(10));
    assert_eq!(stats.utilization, 0.2);
    assert!(!stats.is_closed);

    println!("Queue stats: {}", stats);
}

#[tokio::test]
async fn test_unbounded_queue() {
    let queue = BoundedQueue::unbounded();
    assert_eq!(queue.capacity().limit(), None);

    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();

    // Never suspends
    for i in 0..1000 {
        sender.try_send(i).unwrap();
    }
    drop(sender);

    let mut items = Vec::new();
    while let Some(item) = receiver.recv().await {
        items.push(item);
    }
    assert_eq!(items, (0..1000).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_rendezvous_send_waits_for_consumer() {
    let queue = BoundedQueue::bounded(0);
    assert_eq!(queue.capacity(), QueueCapacity::Rendezvous);

    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();
    assert!(matches!(sender.try_send(1), Err(TrySendError::Full(1))));

    let completed = Arc::new(AtomicUsize::new(0));
    let completed_clone = Arc::clone(&completed);
    let producer = tokio::spawn(async move {
        for i in 0..3 {
            sender.send(i).await.unwrap();
            completed_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    // The first value is waiting in the hand-off slot but has not been taken
    assert_eq!(completed.load(Ordering::SeqCst), 0);

    assert_eq!(receiver.recv().await, Some(0));
    assert_eq!(receiver.recv().await, Some(1));
    assert_eq!(receiver.recv().await, Some(2));
    producer.await.unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_concurrent_access_preserves_order() {
    let queue = BoundedQueue::bounded(4);
    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();

    let producer = tokio::spawn(async move {
        for i in 0..50 {
            sender.send(i).await.unwrap();
        }
    });

    let consumer = tokio::spawn(async move {
        let mut items = Vec::new();
        while let Some(item) = receiver.recv().await {
            items.push(item);
        }
        items
    });

    let (_, items) = tokio::join!(producer, consumer);
    assert_eq!(items.unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_each_end_is_taken_once() {
    let queue: BoundedQueue<i32> = BoundedQueue::bounded(1);
    let _receiver = queue.take_receiver().unwrap();
    assert!(matches!(queue.take_receiver(), Err(FlowError::Usage(_))));

    let _sender = queue.take_sender().unwrap();
    assert!(matches!(queue.take_sender(), Err(FlowError::Usage(_))));
}

#[test]
fn test_recv_pending_until_value_arrives() {
    let queue = BoundedQueue::bounded(1);
    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();

    let mut recv = tokio_test::task::spawn(receiver.recv());
    assert_pending!(recv.poll());

    assert_ok!(sender.try_send(7));
    assert!(recv.is_woken());
    assert_eq!(assert_ready!(recv.poll()), Some(7));
}

#[tokio::test]
async fn test_rendezvous_send_fails_when_consumer_closes_before_taking() {
    let queue = BoundedQueue::bounded(0);
    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();

    let handoff = tokio::spawn(async move { sender.send("never taken").await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handoff.is_finished());
    assert_eq!(queue.len(), 1);

    receiver.close();
    let result = tokio::time::timeout(Duration::from_secs(1), handoff)
        .await
        .expect("a pending hand-off should be released")
        .unwrap();
    assert_eq!(result, Err(FlowError::Closed));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_length_tracks_send_and_recv() {
    let queue = BoundedQueue::bounded(4);
    let sender = queue.take_sender().unwrap();
    let mut receiver = queue.take_receiver().unwrap();

    for i in 0..3 {
        sender.send(i).await.unwrap();
    }
    assert_eq!(queue.len(), 3);
    assert_eq!(receiver.try_recv(), Some(0));
    assert_eq!(receiver.recv().await, Some(1));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.stats().utilization, 0.25);
}
