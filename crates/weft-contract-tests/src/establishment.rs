//! “连接建立”主题：完成通路的恰好一次与取消的硬静默保证。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use weft_transport::{SetupCompletion, Transport, TransportSetup};

use crate::case::{TckCase, TckSuite};
use crate::factory::TransportFactory;
use crate::support::RecordingCompletion;

const CASES: &[TckCase] = &[
    TckCase {
        name: "initiate_delivers_usable_pair",
        test: initiate_delivers_usable_pair,
    },
    TckCase {
        name: "cancel_before_initiate_is_quiescent",
        test: cancel_before_initiate_is_quiescent,
    },
    TckCase {
        name: "cancel_after_establish_leaves_transport_usable",
        test: cancel_after_establish_leaves_transport_usable,
    },
    TckCase {
        name: "cancel_racing_initiate_freezes_completions",
        test: cancel_racing_initiate_freezes_completions,
    },
];

const SUITE: TckSuite = TckSuite {
    name: "establishment",
    cases: CASES,
};

/// 返回“连接建立”主题的测试套件。
pub const fn suite() -> &'static TckSuite {
    &SUITE
}

fn wait_ready(completion: &RecordingCompletion, expected: usize, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while completion.ready_count() < expected {
        assert!(Instant::now() < deadline, "等待 {what} 超时");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// 建立成功时两侧完成器各被交付一次，产出的端点立即可用。
fn initiate_delivers_usable_pair(factory: &dyn TransportFactory) {
    let initiator = RecordingCompletion::new();
    let acceptor = RecordingCompletion::new();
    let setup = factory.setup(
        Arc::clone(&initiator) as Arc<dyn SetupCompletion>,
        Arc::clone(&acceptor) as Arc<dyn SetupCompletion>,
    );

    setup.initiate();
    wait_ready(&initiator, 1, "发起端建立完成");
    wait_ready(&acceptor, 1, "受理端建立完成");

    let client = initiator.transport().expect("应已交付传输");
    let stream = client.init_stream(None).expect("新建传输应可立即开流");
    let peer_stream = acceptor.callbacks().wait_accepted();

    client.send_batch(&stream, vec![weft_transport::StreamOp::data("ready")], true);
    assert_eq!(acceptor.callbacks().wait_data(&peer_stream, 5), b"ready");
}

/// 取消返回后不得再有任何完成交付。
fn cancel_before_initiate_is_quiescent(factory: &dyn TransportFactory) {
    let initiator = RecordingCompletion::new();
    let acceptor = RecordingCompletion::new();
    let setup = factory.setup(
        Arc::clone(&initiator) as Arc<dyn SetupCompletion>,
        Arc::clone(&acceptor) as Arc<dyn SetupCompletion>,
    );

    setup.cancel();
    setup.initiate();
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(initiator.ready_count(), 0, "取消后仍交付了传输");
    assert_eq!(acceptor.ready_count(), 0, "取消后仍交付了传输");
}

/// 取消与在途的 `initiate` 并发竞争时，`cancel` 返回那一刻的完成计数
/// 即为最终值：此后不得再有任何完成交付。
fn cancel_racing_initiate_freezes_completions(factory: &dyn TransportFactory) {
    // 竞争窗口极窄，重复多轮以覆盖两种交错。
    for _ in 0..16 {
        let initiator = RecordingCompletion::new();
        let acceptor = RecordingCompletion::new();
        let setup = factory.setup(
            Arc::clone(&initiator) as Arc<dyn SetupCompletion>,
            Arc::clone(&acceptor) as Arc<dyn SetupCompletion>,
        );

        let racer = Arc::clone(&setup);
        let in_flight = std::thread::spawn(move || racer.initiate());
        setup.cancel();
        let frozen_initiator = initiator.ready_count();
        let frozen_acceptor = acceptor.ready_count();
        in_flight.join().expect("initiate 线程不应 panic");

        assert_eq!(
            initiator.ready_count(),
            frozen_initiator,
            "cancel 返回后仍有完成交付"
        );
        assert_eq!(
            acceptor.ready_count(),
            frozen_acceptor,
            "cancel 返回后仍有完成交付"
        );
        assert!(frozen_initiator <= 1 && frozen_acceptor <= 1);
    }
}

/// 取消只终结建立本身，已交付的传输不受影响。
fn cancel_after_establish_leaves_transport_usable(factory: &dyn TransportFactory) {
    let initiator = RecordingCompletion::new();
    let acceptor = RecordingCompletion::new();
    let setup = factory.setup(
        Arc::clone(&initiator) as Arc<dyn SetupCompletion>,
        Arc::clone(&acceptor) as Arc<dyn SetupCompletion>,
    );

    setup.initiate();
    wait_ready(&initiator, 1, "建立完成");
    setup.cancel();

    let client = initiator.transport().expect("应已交付传输");
    let counter = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&counter);
    client.ping(Box::new(move || {
        observed.fetch_add(1, Ordering::SeqCst);
    }));
    crate::support::wait_counter(&counter, 1, "取消后的 ping 完成");
}
