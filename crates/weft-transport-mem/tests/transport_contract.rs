//! 以契约测试套件（TCK）验证内存传输实现，并补充若干实现特有的场景。

use std::sync::Arc;

use weft_contract_tests::support::RecordingCallbacks;
use weft_contract_tests::{TransportFactory, TransportPair};
use weft_transport::{
    SetupCompletion, StreamOp, Transport, TransportCallbacks, TransportSetup,
};
use weft_transport_mem::{MemFabricBuilder, MemSetup};

/// 把记录器接到建立完成通路上的最小完成器。
struct RecordingBridge {
    callbacks: Arc<RecordingCallbacks>,
}

impl SetupCompletion for RecordingBridge {
    fn transport_ready(&self, _transport: Arc<dyn Transport>) -> Arc<dyn TransportCallbacks> {
        Arc::clone(&self.callbacks) as Arc<dyn TransportCallbacks>
    }
}

struct MemFactory;

fn establish_with(builder: MemFabricBuilder) -> TransportPair {
    let client_cb = RecordingCallbacks::new();
    let server_cb = RecordingCallbacks::new();
    let pair = builder.establish(
        &RecordingBridge {
            callbacks: Arc::clone(&client_cb),
        },
        &RecordingBridge {
            callbacks: Arc::clone(&server_cb),
        },
    );
    TransportPair {
        client: pair.initiator,
        server: pair.acceptor,
        client_cb,
        server_cb,
    }
}

impl TransportFactory for MemFactory {
    fn establish(&self) -> TransportPair {
        establish_with(MemFabricBuilder::new())
    }

    fn establish_tuned(
        &self,
        initial_window: usize,
        max_concurrent_streams: usize,
    ) -> TransportPair {
        establish_with(
            MemFabricBuilder::new()
                .initial_window(initial_window)
                .max_concurrent_streams(max_concurrent_streams),
        )
    }

    fn setup(
        &self,
        initiator: Arc<dyn SetupCompletion>,
        acceptor: Arc<dyn SetupCompletion>,
    ) -> Arc<dyn TransportSetup> {
        Arc::new(MemSetup::new(MemFabricBuilder::new(), initiator, acceptor))
    }
}

#[test]
fn lifecycle_contract() {
    weft_contract_tests::run_lifecycle_suite(&MemFactory);
}

#[test]
fn flow_contract() {
    weft_contract_tests::run_flow_suite(&MemFactory);
}

#[test]
fn control_contract() {
    weft_contract_tests::run_control_suite(&MemFactory);
}

#[test]
fn establishment_contract() {
    weft_contract_tests::run_establishment_suite(&MemFactory);
}

/// 同一连接上的两条流互不串扰：数据、终结都只落在各自的流上。
#[test]
fn concurrent_streams_stay_isolated() {
    let pair = MemFactory.establish();

    let first = pair.client.init_stream(None).expect("首条流应获准");
    let first_peer = pair.server_cb.wait_accepted();
    let second = pair.client.init_stream(None).expect("次条流应获准");
    let second_peer = pair
        .server_cb
        .snapshot()
        .iter()
        .filter_map(|entry| match entry {
            weft_contract_tests::support::UpcallRecord::Accepted { stream } => {
                Some(stream.clone())
            }
            _ => None,
        })
        .find(|stream| *stream != first_peer)
        .expect("第二条流应已受理");

    pair.client
        .send_batch(&first, vec![StreamOp::data("alpha")], true);
    pair.client
        .send_batch(&second, vec![StreamOp::data("beta")], false);

    assert_eq!(pair.server_cb.wait_data(&first_peer, 5), b"alpha");
    assert_eq!(pair.server_cb.wait_data(&second_peer, 4), b"beta");

    // 终结首条流不得波及次条。
    pair.server.send_batch(&first_peer, Vec::new(), true);
    pair.client_cb.wait_stream_closed(&first);
    assert_eq!(pair.client_cb.closed_count(&second), 0);
    assert_eq!(pair.server_cb.closed_count(&second_peer), 0);

    pair.client.destroy_stream(first);
    pair.server.destroy_stream(first_peer);
}

/// 批次内操作次序原样呈现：元数据先于数据到达。
#[test]
fn batch_order_is_preserved() {
    let pair = MemFactory.establish();

    let stream = pair.client.init_stream(None).expect("开流应成功");
    let peer = pair.server_cb.wait_accepted();

    pair.client.send_batch(
        &stream,
        vec![
            StreamOp::metadata("content-type", "text/plain"),
            StreamOp::data("payload"),
        ],
        true,
    );
    pair.server_cb.wait_data(&peer, 7);

    let batch_ops: Vec<StreamOp> = pair
        .server_cb
        .snapshot()
        .iter()
        .filter_map(|entry| match entry {
            weft_contract_tests::support::UpcallRecord::Batch { stream, ops, .. }
                if *stream == peer =>
            {
                Some(ops.clone())
            }
            _ => None,
        })
        .flatten()
        .collect();
    assert!(
        matches!(batch_ops.first(), Some(StreamOp::Metadata(item)) if item.key == "content-type"),
        "元数据应先于数据投递"
    );
    assert!(
        batch_ops
            .iter()
            .any(|op| matches!(op, StreamOp::Data(payload) if &payload[..] == b"payload")),
        "数据应完整到达"
    );
}

/// 发出 goaway 的一端进入告知态而非排空态：本端仍可主动开流，
/// 处于排空的对端照常受理这些流。
#[test]
fn goaway_sender_still_opens_streams() {
    let pair = MemFactory.establish();

    pair.server.goaway(
        weft_transport::StatusCode::Unavailable,
        bytes::Bytes::from_static(b"winding-down"),
    );
    pair.client_cb.wait_goaway();

    let stream = pair
        .server
        .init_stream(None)
        .expect("goaway 发出方自身开流不应受限");
    let peer = pair.client_cb.wait_accepted();

    pair.server
        .send_batch(&stream, vec![StreamOp::data("tail")], true);
    assert_eq!(pair.client_cb.wait_data(&peer, 4), b"tail");

    pair.client.send_batch(&peer, Vec::new(), true);
    pair.server_cb.wait_stream_closed(&stream);
    pair.client_cb.wait_stream_closed(&peer);
    pair.server.destroy_stream(stream);
    pair.client.destroy_stream(peer);
}

/// 任一端句柄全部释放后，存活端的操作退化为本端记账而非悬垂。
#[test]
fn surviving_end_tolerates_dropped_peer() {
    let pair = MemFactory.establish();
    let stream = pair.client.init_stream(None).expect("开流应成功");
    pair.server_cb.wait_accepted();

    drop(pair.server);

    // 对端已消失：发送与中止都应静默完成本端记账。
    pair.client
        .send_batch(&stream, vec![StreamOp::data("into-the-void")], false);
    pair.client
        .abort_stream(&stream, weft_transport::StatusCode::Unavailable);
    pair.client_cb.wait_stream_closed(&stream);
    pair.client.destroy_stream(stream);
    pair.client.close();
    pair.client_cb.wait_transport_closed();
}
