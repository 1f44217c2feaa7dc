//! 窗口与批次划分的随机化验证。
//!
//! 性质：无论初始窗口多小、批次怎样切分，数据都按原序完整送达，
//! 且接收方向恰在半关闭冲出后收口。

use std::sync::Arc;

use proptest::prelude::*;
use weft_contract_tests::support::RecordingCallbacks;
use weft_transport::{
    SetupCompletion, StreamOp, Transport, TransportCallbacks,
};
use weft_transport_mem::MemFabricBuilder;

struct Bridge {
    callbacks: Arc<RecordingCallbacks>,
}

impl SetupCompletion for Bridge {
    fn transport_ready(&self, _transport: Arc<dyn Transport>) -> Arc<dyn TransportCallbacks> {
        Arc::clone(&self.callbacks) as Arc<dyn TransportCallbacks>
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn payloads_survive_arbitrary_windows(
        window in 1usize..48,
        chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..64),
            1..8,
        ),
    ) {
        let client_cb = RecordingCallbacks::new();
        let server_cb = RecordingCallbacks::new();
        let pair = MemFabricBuilder::new()
            .initial_window(window)
            .establish(
                &Bridge { callbacks: Arc::clone(&client_cb) },
                &Bridge { callbacks: Arc::clone(&server_cb) },
            );

        let stream = pair.initiator.init_stream(None).expect("开流应成功");
        let peer = server_cb.wait_accepted();

        let expected: Vec<u8> = chunks.iter().flatten().copied().collect();
        let last = chunks.len() - 1;
        for (index, chunk) in chunks.into_iter().enumerate() {
            pair.initiator.send_batch(
                &stream,
                vec![StreamOp::data(chunk)],
                index == last,
            );
        }

        prop_assert_eq!(server_cb.wait_data(&peer, expected.len()), expected);

        // 半关闭排在全部数据之后：收齐即收口，且只收口一次。
        let states = server_cb.final_states(&peer);
        prop_assert!(!states.last().expect("应有投递").can_recv());

        pair.acceptor.send_batch(&peer, Vec::new(), true);
        client_cb.wait_stream_closed(&stream);
        server_cb.wait_stream_closed(&peer);
        prop_assert_eq!(client_cb.closed_count(&stream), 1);
        prop_assert_eq!(server_cb.closed_count(&peer), 1);

        pair.initiator.destroy_stream(stream);
        pair.acceptor.destroy_stream(peer);
    }
}
