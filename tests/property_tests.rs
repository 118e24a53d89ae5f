use quickcheck::{quickcheck, TestResult};
use rs2_flow::*;
use tokio::runtime::Builder;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

quickcheck! {
    fn prop_flow_of_preserves_order(values: Vec<i32>) -> bool {
        let expected = values.clone();
        block_on(flow_of(values).to_vec()) == Ok(expected)
    }

    fn prop_map_filter_matches_iterator(values: Vec<i32>) -> bool {
        let expected: Vec<i64> = values
            .iter()
            .filter(|x| *x % 3 == 0)
            .map(|x| *x as i64 * 2)
            .collect();
        let flow = from_iter(values)
            .filter(|x| x % 3 == 0)
            .map(|x| x as i64 * 2);
        block_on(flow.to_vec()) == Ok(expected)
    }

    fn prop_take_is_prefix(values: Vec<u8>, n: u8) -> TestResult {
        let n = n as usize;
        let expected: Vec<u8> = values.iter().copied().take(n).collect();
        match block_on(from_iter(values).take(n).to_vec()) {
            Ok(taken) if taken == expected => TestResult::passed(),
            _ => TestResult::failed(),
        }
    }

    fn prop_bridge_preserves_order(values: Vec<u16>, capacity: u8) -> bool {
        let expected = values.clone();
        let config = ChannelConfig::new().capacity(capacity as usize);
        block_on(from_iter(values).buffer(config).to_vec()) == Ok(expected)
    }
}
