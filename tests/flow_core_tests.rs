use futures_util::stream;
use futures_util::StreamExt;
use rs2_flow::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_flow_of_emits_in_order() {
    let fixed = flow_of(vec![1, 2, 3, 4, 5]);
    assert_eq!(fixed.to_vec().await.unwrap(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_definition_is_inert_until_activated() {
    let started = Arc::new(AtomicUsize::new(0));
    let started_clone = Arc::clone(&started);
    let flow = Flow::define(move |mut out| {
        started_clone.fetch_add(1, Ordering::SeqCst);
        async move {
            out.emit(1).await?;
            Ok(())
        }
    })
    .map(|x| x + 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(started.load(Ordering::SeqCst), 0);

    assert_eq!(flow.to_vec().await.unwrap(), vec![2]);
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_each_activation_reruns_the_producer() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = Arc::clone(&runs);
    let flow = Flow::define(move |mut out| {
        let run = runs_clone.fetch_add(1, Ordering::SeqCst);
        async move {
            for i in 0..3 {
                out.emit(run * 10 + i).await?;
            }
            Ok(())
        }
    });

    assert_eq!(flow.to_vec().await.unwrap(), vec![0, 1, 2]);
    assert_eq!(flow.to_vec().await.unwrap(), vec![10, 11, 12]);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_define_with_delay() {
    let flow = Flow::define(|mut out| async move {
        for i in 1..=5 {
            out.delay(Duration::from_millis(5)).await?;
            out.emit(i).await?;
        }
        Ok(())
    });
    assert_eq!(flow.to_vec().await.unwrap(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_from_iter_range_and_collection() {
    assert_eq!(from_iter(1..=3).to_vec().await.unwrap(), vec![1, 2, 3]);
    let names = vec!["a".to_string(), "b".to_string()];
    assert_eq!(from_iter(names.clone()).to_vec().await.unwrap(), names);
}

#[tokio::test]
async fn test_empty_flow_completes() {
    let completed = Arc::new(AtomicUsize::new(0));
    let completed_clone = Arc::clone(&completed);
    let termination = empty::<i32>()
        .collect_in(
            &SchedulerContext::current(),
            CancellationToken::new(),
            Subscriber::new(|_| panic!("no values expected"))
                .on_complete(move || {
                    completed_clone.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap();

    assert_eq!(termination, Termination::Completed);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_producer_failure_after_values() {
    let flow = Flow::define(|mut out| async move {
        out.emit(1).await?;
        out.emit(2).await?;
        Err(FlowError::producer("boom"))
    });

    let values = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let completions = Arc::new(AtomicUsize::new(0));
    let (v, e, c) = (values.clone(), errors.clone(), completions.clone());

    let termination = flow
        .collect_in(
            &SchedulerContext::current(),
            CancellationToken::new(),
            Subscriber::new(move |x| v.lock().unwrap().push(x))
                .on_error(move |err| e.lock().unwrap().push(err))
                .on_complete(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap();

    assert_eq!(*values.lock().unwrap(), vec![1, 2]);
    assert_eq!(
        *errors.lock().unwrap(),
        vec![FlowError::Producer("boom".to_string())]
    );
    assert_eq!(completions.load(Ordering::SeqCst), 0);
    assert_eq!(termination.error(), Some(&FlowError::Producer("boom".to_string())));
}

#[tokio::test]
async fn test_failed_flow_reports_error() {
    let result = failed::<i32>(FlowError::producer("nope")).to_vec().await;
    assert_eq!(result, Err(FlowError::Producer("nope".to_string())));
}

#[tokio::test]
async fn test_producer_panic_becomes_failure() {
    let flow: Flow<i32> = Flow::define(|mut out| async move {
        out.emit(1).await?;
        panic!("producer exploded");
    });

    match flow.to_vec().await {
        Err(FlowError::Producer(message)) => assert!(message.contains("producer exploded")),
        other => panic!("expected a producer failure, got {:?}", other),
    }
}

#[test]
fn test_collect_outside_runtime_is_usage_error() {
    let flow = flow_of(vec![1, 2, 3]);
    let result = futures::executor::block_on(flow.collect(|_| {}));
    assert!(matches!(result, Err(FlowError::Usage(_))));
}

#[tokio::test]
async fn test_from_stream_fn_is_cold() {
    let flow = from_stream_fn(|| stream::iter(vec![1, 2, 3]));
    assert_eq!(flow.to_vec().await.unwrap(), vec![1, 2, 3]);
    assert_eq!(flow.to_vec().await.unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_fold() {
    let sum = from_iter(1..=10).fold(0, |acc, x| acc + x).await.unwrap();
    assert_eq!(sum, 55);
}

#[tokio::test]
async fn test_into_stream_yields_values_then_error() {
    let flow = Flow::define(|mut out| async move {
        out.emit(1).await?;
        out.emit(2).await?;
        Err(FlowError::producer("late failure"))
    });

    let items: Vec<FlowResult<i32>> = flow.into_stream().unwrap().collect().await;
    assert_eq!(
        items,
        vec![
            Ok(1),
            Ok(2),
            Err(FlowError::Producer("late failure".to_string()))
        ]
    );
}

#[tokio::test]
async fn test_dropping_stream_cancels_producer() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let cancelled_clone = Arc::clone(&cancelled);
    let flow = Flow::define(move |mut out| {
        let cancelled = Arc::clone(&cancelled_clone);
        async move {
            let result: FlowResult<()> = async {
                for i in 0.. {
                    out.emit(i).await?;
                    out.checkpoint().await?;
                }
                Ok(())
            }
            .await;
            if matches!(result, Err(FlowError::Cancelled)) {
                cancelled.fetch_add(1, Ordering::SeqCst);
            }
            result
        }
    });

    let mut stream = flow.into_stream().unwrap();
    assert_eq!(stream.next().await, Some(Ok(0)));
    drop(stream);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_emit_after_cancellation_fails() {
    let token = CancellationToken::new();
    let observed = Arc::new(Mutex::new(None));
    let observed_clone = Arc::clone(&observed);
    let cancel = token.clone();

    let flow = Flow::define(move |mut out| {
        let observed = Arc::clone(&observed_clone);
        let cancel = cancel.clone();
        async move {
            out.emit(1).await?;
            cancel.cancel();
            let second = out.emit(2).await;
            *observed.lock().unwrap() = Some(second.clone());
            second
        }
    });

    let termination = flow
        .collect_in(
            &SchedulerContext::current(),
            token,
            Subscriber::new(|_: i32| {}),
        )
        .await
        .unwrap();

    assert_eq!(termination, Termination::Cancelled);
    assert_eq!(*observed.lock().unwrap(), Some(Err(FlowError::Cancelled)));
}
