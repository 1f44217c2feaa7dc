//! 成对端点的构建与互联。

use std::fmt;
use std::sync::Arc;

use weft_transport::{SetupCompletion, Transport};

use crate::transport::{Inner, MemTransport};

/// 端点在一对传输中的角色，决定其开启的流标识的奇偶性。
///
/// 发起端使用奇数流标识，受理端使用偶数，两端各自分配互不冲突。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    Initiator,
    Acceptor,
}

impl Role {
    pub(crate) fn first_stream_id(self) -> u64 {
        match self {
            Role::Initiator => 1,
            Role::Acceptor => 2,
        }
    }
}

/// 建立一对端点时固化的参数。
#[derive(Clone, Copy, Debug)]
pub(crate) struct MemOptions {
    pub(crate) initial_window: usize,
    pub(crate) max_concurrent_streams: usize,
}

/// 一次建立产出的两个互联端点。
///
/// 两个句柄各自独立计数：任意一端被全部释放后，另一端的跨端操作
/// 自然退化为本端记账，不会悬垂。
#[derive(Clone)]
pub struct MemPair {
    pub initiator: Arc<dyn Transport>,
    pub acceptor: Arc<dyn Transport>,
}

impl fmt::Debug for MemPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemPair")
            .field("initiator", &self.initiator.id())
            .field("acceptor", &self.acceptor.id())
            .finish()
    }
}

/// 内存传输对的构建器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把窗口与并发上限这类"建立时刻固化"的参数收拢到一处，
///   避免端点在运行期携带可变配置。
///
/// ## 契约（What）
/// - [`establish`](MemFabricBuilder::establish) 返回前，两端的
///   `transport_ready` 各被调用恰好一次，回调挂接完成；
///   返回后任何一端即可立即开流。
///
/// ## 用法
/// ```ignore
/// let pair = MemFabricBuilder::new()
///     .initial_window(16 * 1024)
///     .establish(&client_side, &server_side);
/// let stream = pair.initiator.init_stream(None)?;
/// ```
#[derive(Clone, Copy, Debug)]
pub struct MemFabricBuilder {
    opts: MemOptions,
}

impl MemFabricBuilder {
    pub fn new() -> Self {
        MemFabricBuilder {
            opts: MemOptions {
                initial_window: 65_535,
                max_concurrent_streams: 128,
            },
        }
    }

    /// 每条流建立时的初始发送窗口（字节）。
    pub fn initial_window(mut self, bytes: usize) -> Self {
        self.opts.initial_window = bytes;
        self
    }

    /// 单端同时持有的流记录数上限，超出即准入失败。
    pub fn max_concurrent_streams(mut self, limit: usize) -> Self {
        self.opts.max_concurrent_streams = limit;
        self
    }

    /// 建立一对互联端点并挂接两侧回调。
    pub fn establish(
        &self,
        initiator: &dyn SetupCompletion,
        acceptor: &dyn SetupCompletion,
    ) -> MemPair {
        let a = Arc::new(Inner::new(Role::Initiator, self.opts));
        let b = Arc::new(Inner::new(Role::Acceptor, self.opts));
        let _ = a.peer.set(Arc::downgrade(&b));
        let _ = b.peer.set(Arc::downgrade(&a));

        let initiator_transport: Arc<dyn Transport> = Arc::new(MemTransport {
            inner: Arc::clone(&a),
        });
        let acceptor_transport: Arc<dyn Transport> = Arc::new(MemTransport {
            inner: Arc::clone(&b),
        });
        let _ = a
            .callbacks
            .set(initiator.transport_ready(Arc::clone(&initiator_transport)));
        let _ = b
            .callbacks
            .set(acceptor.transport_ready(Arc::clone(&acceptor_transport)));
        tracing::debug!(
            initiator = %a.id,
            acceptor = %b.id,
            "memory transport pair established"
        );
        MemPair {
            initiator: initiator_transport,
            acceptor: acceptor_transport,
        }
    }
}

impl Default for MemFabricBuilder {
    fn default() -> Self {
        Self::new()
    }
}
