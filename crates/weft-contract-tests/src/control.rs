//! “连接级控制面”主题：Ping、goaway、轮询集与存储能力汇报。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use weft_transport::{AdmitError, PingCompletion, StatusCode, StreamOp, Transport};

use crate::case::{TckCase, TckSuite};
use crate::factory::TransportFactory;
use crate::support::{RecordingPollset, wait_counter};

const CASES: &[TckCase] = &[
    TckCase {
        name: "ping_completes_exactly_once",
        test: ping_completes_exactly_once,
    },
    TckCase {
        name: "ping_after_close_never_completes",
        test: ping_after_close_never_completes,
    },
    TckCase {
        name: "goaway_is_advisory",
        test: goaway_is_advisory,
    },
    TckCase {
        name: "pollset_registration_reports_transport",
        test: pollset_registration_reports_transport,
    },
    TckCase {
        name: "storage_size_is_a_stable_capability",
        test: storage_size_is_a_stable_capability,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "control",
    cases: CASES,
};

/// 返回“连接级控制面”主题的测试套件。
pub const fn suite() -> &'static TckSuite {
    &SUITE
}

fn counting_completion(counter: &Arc<AtomicUsize>) -> PingCompletion {
    let counter = Arc::clone(counter);
    Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

/// 活跃连接上的探测恰好完成一次。
fn ping_completes_exactly_once(factory: &dyn TransportFactory) {
    let pair = factory.establish();
    let counter = Arc::new(AtomicUsize::new(0));

    pair.client.ping(counting_completion(&counter));
    wait_counter(&counter, 1, "ping 完成");

    // 第二次探测独立完成，首个完成器不得被重复触发。
    pair.client.ping(counting_completion(&counter));
    wait_counter(&counter, 2, "第二次 ping 完成");
}

/// 关闭后的探测允许被静默丢弃，完成器不得再触发。
fn ping_after_close_never_completes(factory: &dyn TransportFactory) {
    let pair = factory.establish();
    pair.client.close();
    pair.client_cb.wait_transport_closed();

    let counter = Arc::new(AtomicUsize::new(0));
    pair.client.ping(counting_completion(&counter));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::SeqCst), 0, "关闭后的探测不应完成");
}

/// goaway 只是告知：既有流继续运转，新开流以 `Draining` 被拒。
fn goaway_is_advisory(factory: &dyn TransportFactory) {
    let pair = factory.establish();

    let client_stream = pair.client.init_stream(None).expect("开流应成功");
    let server_stream = pair.server_cb.wait_accepted();

    pair.server
        .goaway(StatusCode::Unavailable, bytes::Bytes::from_static(b"maintenance"));
    let (status, debug) = pair.client_cb.wait_goaway();
    assert_eq!(status, StatusCode::Unavailable);
    assert_eq!(&debug[..], b"maintenance");

    // 既有流不受影响。
    pair.client
        .send_batch(&client_stream, vec![StreamOp::data("still-on")], true);
    assert_eq!(pair.server_cb.wait_data(&server_stream, 8), b"still-on");
    assert_eq!(pair.client_cb.closed_count(&client_stream), 0);

    // 新开流被引导去别处。
    match pair.client.init_stream(None) {
        Err(AdmitError::Draining) => {}
        other => panic!("goaway 之后的准入应返回 Draining，得到 {other:?}"),
    }

    pair.server.send_batch(&server_stream, Vec::new(), true);
    pair.client_cb.wait_stream_closed(&client_stream);
    pair.server_cb.wait_stream_closed(&server_stream);
    pair.client.destroy_stream(client_stream);
    pair.server.destroy_stream(server_stream);
}

/// 轮询集挂接以传输标识为凭。
fn pollset_registration_reports_transport(factory: &dyn TransportFactory) {
    let pair = factory.establish();
    let pollset = RecordingPollset::new();

    pair.client.add_to_pollset(&pollset);
    pair.server.add_to_pollset(&pollset);

    let registered = pollset.registered();
    assert!(registered.contains(&pair.client.id()));
    assert!(registered.contains(&pair.server.id()));
}

/// 流存储尺寸是传输的固定能力：非零且在生命周期内不变。
fn storage_size_is_a_stable_capability(factory: &dyn TransportFactory) {
    let pair = factory.establish();
    let before = pair.client.stream_storage_size();
    assert!(before > 0, "流存储尺寸应为正值");

    let stream = pair.client.init_stream(None).expect("开流应成功");
    assert_eq!(pair.client.stream_storage_size(), before);

    pair.client.abort_stream(&stream, StatusCode::Cancelled);
    pair.client_cb.wait_stream_closed(&stream);
    pair.client.destroy_stream(stream);
}
