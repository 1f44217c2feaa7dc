//! “流量控制”主题：窗口、信用回授门控与接收缓冲分块。

use weft_transport::{StreamOp, Transport};

use crate::case::{TckCase, TckSuite};
use crate::factory::TransportFactory;

const CASES: &[TckCase] = &[
    TckCase {
        name: "small_window_still_delivers_everything",
        test: small_window_still_delivers_everything,
    },
    TckCase {
        name: "closed_gate_withholds_credit",
        test: closed_gate_withholds_credit,
    },
    TckCase {
        name: "half_close_stays_ordered_behind_parked_data",
        test: half_close_stays_ordered_behind_parked_data,
    },
    TckCase {
        name: "recv_buffers_bound_chunking",
        test: recv_buffers_bound_chunking,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "flow",
    cases: CASES,
};

/// 返回“流量控制”主题的测试套件。
pub const fn suite() -> &'static TckSuite {
    &SUITE
}

/// 窗口远小于载荷时，靠接收侧持续回授信用仍应送达全部数据。
fn small_window_still_delivers_everything(factory: &dyn TransportFactory) {
    let pair = factory.establish_tuned(4, 16);

    let client_stream = pair.client.init_stream(None).expect("开流应成功");
    let server_stream = pair.server_cb.wait_accepted();

    let payload = b"0123456789".to_vec();
    pair.client
        .send_batch(&client_stream, vec![StreamOp::data(payload.clone())], true);

    assert_eq!(pair.server_cb.wait_data(&server_stream, payload.len()), payload);

    pair.server.send_batch(&server_stream, Vec::new(), true);
    pair.client_cb.wait_stream_closed(&client_stream);
    pair.server_cb.wait_stream_closed(&server_stream);
    pair.client.destroy_stream(client_stream);
    pair.server.destroy_stream(server_stream);
}

/// 流量门关闭时：既有窗口内的数据照常投递，其后的信用被暂扣；
/// 重新开门后积压一次性补发，传输恢复流动。
fn closed_gate_withholds_credit(factory: &dyn TransportFactory) {
    let pair = factory.establish_tuned(4, 16);

    let client_stream = pair.client.init_stream(None).expect("开流应成功");
    let server_stream = pair.server_cb.wait_accepted();
    pair.server.set_allow_window_updates(&server_stream, false);

    pair.client
        .send_batch(&client_stream, vec![StreamOp::data("0123456789")], false);

    // 初始窗口内的 4 字节照常到达，之后发送端因无信用而停摆。
    assert_eq!(pair.server_cb.wait_data(&server_stream, 4), b"0123");
    assert_eq!(pair.server_cb.received_data(&server_stream).len(), 4);

    pair.server.set_allow_window_updates(&server_stream, true);
    assert_eq!(pair.server_cb.wait_data(&server_stream, 10), b"0123456789");

    pair.client
        .send_batch(&client_stream, Vec::new(), true);
    pair.server.send_batch(&server_stream, Vec::new(), true);
    pair.client_cb.wait_stream_closed(&client_stream);
    pair.server_cb.wait_stream_closed(&server_stream);
    pair.client.destroy_stream(client_stream);
    pair.server.destroy_stream(server_stream);
}

/// 半关闭信号不得越过仍在等待信用的数据。
fn half_close_stays_ordered_behind_parked_data(factory: &dyn TransportFactory) {
    let pair = factory.establish_tuned(4, 16);

    let client_stream = pair.client.init_stream(None).expect("开流应成功");
    let server_stream = pair.server_cb.wait_accepted();
    pair.server.set_allow_window_updates(&server_stream, false);

    pair.client
        .send_batch(&client_stream, vec![StreamOp::data("abcdef")], true);
    pair.server_cb.wait_data(&server_stream, 4);

    // 数据尚未送齐，接收方向不得提前关闭。
    for state in pair.server_cb.final_states(&server_stream) {
        assert!(state.can_recv(), "半关闭越过了滞留数据：{state:?}");
    }

    pair.server.set_allow_window_updates(&server_stream, true);
    assert_eq!(pair.server_cb.wait_data(&server_stream, 6), b"abcdef");
    let states = pair.server_cb.final_states(&server_stream);
    assert!(
        !states.last().expect("应有投递记录").can_recv(),
        "剩余数据送达后接收方向应随半关闭收口"
    );

    pair.server.send_batch(&server_stream, Vec::new(), true);
    pair.client_cb.wait_stream_closed(&client_stream);
    pair.server_cb.wait_stream_closed(&server_stream);
    pair.client.destroy_stream(client_stream);
    pair.server.destroy_stream(server_stream);
}

/// 入站数据按上层给出的接收缓冲切块，内容与次序不变。
fn recv_buffers_bound_chunking(factory: &dyn TransportFactory) {
    let pair = factory.establish();
    pair.server_cb.set_recv_buffer_cap(Some(3));

    let client_stream = pair.client.init_stream(None).expect("开流应成功");
    let server_stream = pair.server_cb.wait_accepted();

    pair.client
        .send_batch(&client_stream, vec![StreamOp::data("abcdefgh")], true);
    assert_eq!(pair.server_cb.wait_data(&server_stream, 8), b"abcdefgh");
    for size in pair.server_cb.data_op_sizes(&server_stream) {
        assert!(size <= 3, "数据操作超出接收缓冲容量：{size}");
    }

    pair.server.send_batch(&server_stream, Vec::new(), true);
    pair.client_cb.wait_stream_closed(&client_stream);
    pair.server_cb.wait_stream_closed(&server_stream);
    pair.client.destroy_stream(client_stream);
    pair.server.destroy_stream(server_stream);
}
