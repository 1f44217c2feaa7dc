//! “流生命周期”主题：开启、受理、终结投递与销毁纪律。

use std::panic::{self, AssertUnwindSafe};

use weft_transport::{AdmitError, StatusCode, StreamOp, Transport};

use crate::case::{TckCase, TckSuite};
use crate::factory::TransportFactory;
use crate::support::AcceptPolicy;

const CASES: &[TckCase] = &[
    TckCase {
        name: "open_stream_round_trip",
        test: open_stream_round_trip,
    },
    TckCase {
        name: "rejected_stream_is_reset",
        test: rejected_stream_is_reset,
    },
    TckCase {
        name: "abort_terminal_is_exactly_once",
        test: abort_terminal_is_exactly_once,
    },
    TckCase {
        name: "close_terminates_streams_then_reports_closed",
        test: close_terminates_streams_then_reports_closed,
    },
    TckCase {
        name: "admission_fails_after_close",
        test: admission_fails_after_close,
    },
    TckCase {
        name: "admission_respects_stream_limit",
        test: admission_respects_stream_limit,
    },
    TckCase {
        name: "destroy_before_closed_is_a_violation",
        test: destroy_before_closed_is_a_violation,
    },
    TckCase {
        name: "delivered_buffers_are_uniquely_owned",
        test: delivered_buffers_are_uniquely_owned,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "lifecycle",
    cases: CASES,
};

/// 返回“流生命周期”主题的测试套件。
pub const fn suite() -> &'static TckSuite {
    &SUITE
}

/// 一条流的完整往返：开启、双向数据、双向半关闭、两端各恰好一次终结。
fn open_stream_round_trip(factory: &dyn TransportFactory) {
    let pair = factory.establish();

    let client_stream = pair
        .client
        .init_stream(None)
        .expect("开流应在活跃连接上成功");
    let server_stream = pair.server_cb.wait_accepted();

    pair.client.send_batch(
        &client_stream,
        vec![StreamOp::metadata("route", "echo"), StreamOp::data("hello")],
        true,
    );
    assert_eq!(pair.server_cb.wait_data(&server_stream, 5), b"hello");

    pair.server
        .send_batch(&server_stream, vec![StreamOp::data("world")], true);
    assert_eq!(pair.client_cb.wait_data(&client_stream, 5), b"world");

    pair.client_cb.wait_stream_closed(&client_stream);
    pair.server_cb.wait_stream_closed(&server_stream);
    assert_eq!(pair.client_cb.closed_count(&client_stream), 1);
    assert_eq!(pair.server_cb.closed_count(&server_stream), 1);

    pair.client.destroy_stream(client_stream);
    pair.server.destroy_stream(server_stream);
}

/// 受理方丢弃凭证即拒绝；开流端必须收到终结投递而非悬置。
fn rejected_stream_is_reset(factory: &dyn TransportFactory) {
    let pair = factory.establish();
    pair.server_cb.set_accept_policy(AcceptPolicy::Reject);

    let stream = pair.client.init_stream(None).expect("开流本身应成功");
    pair.client_cb.wait_stream_closed(&stream);
    assert_eq!(pair.client_cb.closed_count(&stream), 1);

    pair.client.destroy_stream(stream);
}

/// 中止后终结投递恰好一次；重复中止与后续提交均为无害空操作。
fn abort_terminal_is_exactly_once(factory: &dyn TransportFactory) {
    let pair = factory.establish();

    let client_stream = pair.client.init_stream(None).expect("开流应成功");
    let server_stream = pair.server_cb.wait_accepted();

    pair.client.abort_stream(&client_stream, StatusCode::Cancelled);
    pair.client_cb.wait_stream_closed(&client_stream);
    pair.server_cb.wait_stream_closed(&server_stream);

    // 重复中止与终结后的提交都不得再触发任何投递。
    pair.client.abort_stream(&client_stream, StatusCode::Cancelled);
    pair.client
        .send_batch(&client_stream, vec![StreamOp::data("late")], true);
    assert_eq!(pair.client_cb.closed_count(&client_stream), 1);
    assert_eq!(pair.server_cb.closed_count(&server_stream), 1);

    pair.client.destroy_stream(client_stream);
    pair.server.destroy_stream(server_stream);
}

/// 连接关闭：先逐流终结，后一次 `closed` 通知，且整体幂等。
fn close_terminates_streams_then_reports_closed(factory: &dyn TransportFactory) {
    let pair = factory.establish();

    let client_stream = pair.client.init_stream(None).expect("开流应成功");
    let server_stream = pair.server_cb.wait_accepted();

    pair.client.close();
    pair.client_cb.wait_stream_closed(&client_stream);
    let closed_id = pair.client_cb.wait_transport_closed();
    assert_eq!(closed_id, pair.client.id());

    // 终结投递必须排在 closed 通知之前。
    let log = pair.client_cb.snapshot();
    let terminal_at = log
        .iter()
        .position(|entry| {
            matches!(entry, crate::support::UpcallRecord::Batch { final_state, .. }
                if final_state.is_closed())
        })
        .expect("应有终结投递");
    let closed_at = log
        .iter()
        .position(|entry| matches!(entry, crate::support::UpcallRecord::TransportClosed { .. }))
        .expect("应有 closed 通知");
    assert!(terminal_at < closed_at, "closed 通知早于流终结投递");

    pair.server_cb.wait_stream_closed(&server_stream);

    // 幂等：重复关闭不得产生第二次 closed 通知。
    pair.client.close();
    let repeats = pair
        .client_cb
        .snapshot()
        .iter()
        .filter(|entry| matches!(entry, crate::support::UpcallRecord::TransportClosed { .. }))
        .count();
    assert_eq!(repeats, 1);

    pair.client.destroy_stream(client_stream);
    pair.server.destroy_stream(server_stream);
}

/// 关闭之后的准入必须失败，且以关闭为由。
fn admission_fails_after_close(factory: &dyn TransportFactory) {
    let pair = factory.establish();
    pair.client.close();
    pair.client_cb.wait_transport_closed();

    match pair.client.init_stream(None) {
        Err(AdmitError::Closing) => {}
        other => panic!("关闭后的准入应返回 Closing，得到 {other:?}"),
    }
}

/// 并发流上限生效，销毁释放名额后准入恢复。
fn admission_respects_stream_limit(factory: &dyn TransportFactory) {
    let pair = factory.establish_tuned(65_535, 1);

    let first = pair.client.init_stream(None).expect("首条流应获准");
    match pair.client.init_stream(None) {
        Err(AdmitError::Exhausted { limit }) => assert_eq!(limit, 1),
        other => panic!("超限准入应返回 Exhausted，得到 {other:?}"),
    }

    pair.client.abort_stream(&first, StatusCode::Cancelled);
    pair.client_cb.wait_stream_closed(&first);
    pair.client.destroy_stream(first);

    let second = pair.client.init_stream(None).expect("释放名额后准入应恢复");
    pair.client.abort_stream(&second, StatusCode::Cancelled);
    pair.client_cb.wait_stream_closed(&second);
    pair.client.destroy_stream(second);
}

/// 缓冲所有权随投递彻底移交：流终结并销毁后，投递给上层的数据缓冲
/// 必须是唯一持有，传输不得再保留任何引用。
fn delivered_buffers_are_uniquely_owned(factory: &dyn TransportFactory) {
    let pair = factory.establish();

    let client_stream = pair.client.init_stream(None).expect("开流应成功");
    let server_stream = pair.server_cb.wait_accepted();

    let payload = bytes::Bytes::from(vec![7u8; 256]);
    pair.client
        .send_batch(&client_stream, vec![StreamOp::Data(payload)], true);
    assert_eq!(
        pair.server_cb.wait_data(&server_stream, 256),
        vec![7u8; 256]
    );

    pair.server.send_batch(&server_stream, Vec::new(), true);
    pair.client_cb.wait_stream_closed(&client_stream);
    pair.server_cb.wait_stream_closed(&server_stream);
    pair.client.destroy_stream(client_stream);
    pair.server.destroy_stream(server_stream.clone());

    // 从记录器取走缓冲后，唯一可能残留的引用来自传输侧。
    let delivered = pair.server_cb.take_data_payloads(&server_stream);
    assert!(!delivered.is_empty(), "应有已投递的数据缓冲");
    for payload in delivered {
        assert!(
            payload.try_into_mut().is_ok(),
            "传输在投递之后仍保留缓冲引用"
        );
    }
}

/// 在观察到 `Closed` 之前销毁流是契约违例，必须被断言拦截。
fn destroy_before_closed_is_a_violation(factory: &dyn TransportFactory) {
    let pair = factory.establish();
    let stream = pair.client.init_stream(None).expect("开流应成功");

    let premature = panic::catch_unwind(AssertUnwindSafe(|| {
        pair.client.destroy_stream(stream.clone());
    }));
    assert!(premature.is_err(), "终结前的销毁未被拦截");

    pair.client.abort_stream(&stream, StatusCode::Cancelled);
    pair.client_cb.wait_stream_closed(&stream);
    pair.client.destroy_stream(stream);
}
