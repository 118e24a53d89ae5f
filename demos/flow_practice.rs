//! Walks through the flow constructors and operators end to end:
//! fixed values, collections, producer blocks, channel flows, context
//! switching, map/filter (sync and async), take and take_while.

use rs2_flow::{
    channel_flow, flow_of, from_iter, Flow, SchedulerConfig, SchedulerContext, Subscriber,
};
use std::time::{Duration, Instant};

fn thread_name() -> String {
    std::thread::current().name().unwrap_or("unnamed").to_string()
}

fn main() {
    let io_config = SchedulerConfig::new().name("io").worker_threads(2);
    let main_config = SchedulerConfig::main();
    let io_runtime = io_config.build_runtime().unwrap();
    let main_runtime = main_config.build_runtime().unwrap();
    let io = SchedulerContext::from_runtime(&io_config, &io_runtime);
    let main_ctx = SchedulerContext::from_runtime(&main_config, &main_runtime);

    main_runtime.block_on(async {
        // Fixed values, one every 300ms
        let fixed = flow_of(vec![1, 2, 3, 4, 5]).delay_each(Duration::from_millis(300));
        fixed.collect(|item| println!("fixed: {}", item)).await.unwrap();

        // A collection as a flow
        let list = vec![1, 2, 3, 4, 5];
        let collection = from_iter(list).delay_each(Duration::from_millis(300));
        collection.collect(|item| println!("collection: {}", item)).await.unwrap();

        // A producer block
        let lambda = Flow::define(|mut out| async move {
            for i in 1..=5 {
                out.delay(Duration::from_millis(300)).await?;
                out.emit(i).await?;
            }
            Ok(())
        });
        lambda.collect(|item| println!("producer block: {}", item)).await.unwrap();

        // A channel flow: the producer runs concurrently with the collector
        let channel = channel_flow(|scope| async move {
            for i in 1..=5 {
                scope.delay(Duration::from_millis(300)).await?;
                scope.send(i).await?;
            }
            Ok(())
        });
        channel.collect(|item| println!("channel: {}", item)).await.unwrap();

        // Producer work on the io pool, collection on the main context
        let chain = Flow::define(|mut out| async move {
            for i in 0..=10 {
                println!("in definition block {}", thread_name());
                out.delay(Duration::from_millis(300)).await?; // stands in for an api call
                out.emit(i).await?;
            }
            Ok(())
        })
        .flow_on(io.clone());
        let activation = chain
            .launch(
                &main_ctx,
                Subscriber::new(|item| println!("in collect {}: {}", thread_name(), item))
                    .on_complete(|| println!("chain complete")),
            )
            .unwrap();
        println!("chain ended: {}", activation.join().await);

        // map with a sync function and with an async request
        from_iter(1..=3)
            .map(|num| format!("response is sync {}", num))
            .collect(|response| println!("{}", response))
            .await
            .unwrap();
        from_iter(1..=3)
            .eval_map(|num| async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                format!("response in suspend {}", num)
            })
            .collect(|response| println!("{}", response))
            .await
            .unwrap();

        // filter odd numbers, sync and as a long running check
        from_iter(1..=10)
            .filter(|num| num % 2 != 0)
            .collect(|num| println!("odd: {}", num))
            .await
            .unwrap();
        from_iter(1..=10)
            .eval_filter(|&num| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                num % 2 != 0
            })
            .collect(|num| println!("odd (async): {}", num))
            .await
            .unwrap();

        // Size limiting
        from_iter(1..=10)
            .take(4)
            .collect(|num| println!("take: {}", num))
            .await
            .unwrap();

        // Stops 10ms after the activation started
        from_iter(1..=1000)
            .take_while_with(Instant::now, |started, _| {
                started.elapsed() < Duration::from_millis(10)
            })
            .collect(|num| println!("take_while: {}", num))
            .await
            .unwrap();
    });
}
