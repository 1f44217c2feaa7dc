//! 内存传输的连接建立策略。

use std::sync::Arc;

use parking_lot::Mutex;
use weft_transport::{SetupCompletion, TransportSetup};

use crate::fabric::{MemFabricBuilder, MemPair};

enum SetupState {
    Idle,
    Established(MemPair),
    Cancelled,
}

/// 进程内"连接建立"：`initiate` 同步产出一对互联端点。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 给契约测试与上层通道一个不依赖网络的 Setup 实现，
///   同时示范"取消返回即静默"这条硬保证的标准实现手法。
///
/// ## 逻辑（How）
/// - 完成回调在状态锁内触发：`cancel` 拿到锁的瞬间，在途的完成
///   要么已经整体结束、要么还没开始且再也不会开始；
/// - 由此推论：完成回调内不得回调本 Setup，否则自死锁。
///
/// ## 契约（What）
/// - `initiate` 幂等：已建立或已取消后再调用均为空操作；
/// - `cancel` 终结：之后的 `initiate` 不再产出传输。
pub struct MemSetup {
    builder: MemFabricBuilder,
    initiator: Arc<dyn SetupCompletion>,
    acceptor: Arc<dyn SetupCompletion>,
    state: Mutex<SetupState>,
}

impl MemSetup {
    pub fn new(
        builder: MemFabricBuilder,
        initiator: Arc<dyn SetupCompletion>,
        acceptor: Arc<dyn SetupCompletion>,
    ) -> Self {
        MemSetup {
            builder,
            initiator,
            acceptor,
            state: Mutex::new(SetupState::Idle),
        }
    }

    /// 已建立的端点对；未建立或已取消时为 `None`。
    pub fn established(&self) -> Option<MemPair> {
        match &*self.state.lock() {
            SetupState::Established(pair) => Some(pair.clone()),
            _ => None,
        }
    }
}

impl TransportSetup for MemSetup {
    fn initiate(&self) {
        let mut state = self.state.lock();
        match &*state {
            SetupState::Established(_) | SetupState::Cancelled => return,
            SetupState::Idle => {}
        }
        let pair = self.builder.establish(&*self.initiator, &*self.acceptor);
        tracing::debug!("in-memory setup completed");
        *state = SetupState::Established(pair);
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        if matches!(&*state, SetupState::Idle) {
            tracing::debug!("in-memory setup cancelled before establishment");
        }
        *state = SetupState::Cancelled;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use weft_transport::{
        AcceptToken, SetupCompletion, StatusCode, Stream, StreamOp, StreamState, Transport,
        TransportCallbacks, TransportId, TransportSetup,
    };

    use super::{MemFabricBuilder, MemSetup};

    struct NullCallbacks;

    impl TransportCallbacks for NullCallbacks {
        fn accept_stream(&self, transport: &dyn Transport, token: AcceptToken) {
            let _ = transport.init_stream(Some(token));
        }

        fn recv_batch(&self, _stream: &Stream, _ops: Vec<StreamOp>, _final_state: StreamState) {}

        fn goaway(&self, _status: StatusCode, _debug: Bytes) {}

        fn closed(&self, _transport: TransportId) {}
    }

    struct CountingCompletion {
        ready: AtomicUsize,
    }

    impl CountingCompletion {
        fn new() -> Arc<Self> {
            Arc::new(CountingCompletion {
                ready: AtomicUsize::new(0),
            })
        }
    }

    impl SetupCompletion for CountingCompletion {
        fn transport_ready(
            &self,
            _transport: Arc<dyn Transport>,
        ) -> Arc<dyn TransportCallbacks> {
            self.ready.fetch_add(1, Ordering::SeqCst);
            Arc::new(NullCallbacks)
        }
    }

    #[test]
    fn initiate_completes_each_side_exactly_once() {
        let client = CountingCompletion::new();
        let server = CountingCompletion::new();
        let setup = MemSetup::new(
            MemFabricBuilder::new(),
            Arc::clone(&client) as Arc<dyn SetupCompletion>,
            Arc::clone(&server) as Arc<dyn SetupCompletion>,
        );

        setup.initiate();
        setup.initiate();

        assert_eq!(client.ready.load(Ordering::SeqCst), 1);
        assert_eq!(server.ready.load(Ordering::SeqCst), 1);
        assert!(setup.established().is_some());
    }

    #[test]
    fn cancel_before_initiate_suppresses_completion() {
        let client = CountingCompletion::new();
        let server = CountingCompletion::new();
        let setup = MemSetup::new(
            MemFabricBuilder::new(),
            Arc::clone(&client) as Arc<dyn SetupCompletion>,
            Arc::clone(&server) as Arc<dyn SetupCompletion>,
        );

        setup.cancel();
        setup.initiate();

        assert_eq!(client.ready.load(Ordering::SeqCst), 0);
        assert_eq!(server.ready.load(Ordering::SeqCst), 0);
        assert!(setup.established().is_none());
    }
}
