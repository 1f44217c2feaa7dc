//! 上行回调接口：传输把控制权交还上层的唯一通道。

use alloc::vec::Vec;
use bytes::{Bytes, BytesMut};

use crate::{AcceptToken, StatusCode, Stream, StreamOp, StreamState, Transport, TransportId};

/// 由上层实现、传输消费的上行回调表。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输在网络事件驱动下需要向上层移交数据、受理请求与连接级通知；
///   把这些能力收敛为一张 trait 对象表，在建立完成时与传输一次性绑定；
/// - 上层要携带的私有状态由 trait 对象自身捕获，
///   连接级回调以 [`TransportId`] 指明来源。
///
/// ## 并发模型（How）
/// - 所有回调都在传输的派发线程上执行，处于其内部 I/O 服务路径的时间压力
///   之下：回调内不得阻塞等待进一步的网络活动；
/// - 同一传输的回调彼此串行；跨传输没有次序约定。
///
/// ## 重入禁区（Trade-offs）
/// - `accept_stream` 内只允许调用回传输的 `init_stream`，不得发起其他传输
///   调用；`recv_batch` 内不得调用 `destroy_stream`。两者都是锁序危害，
///   契约选择直接禁止而非以锁层级化解。
pub trait TransportCallbacks: Send + Sync + 'static {
    /// 为入站数据分配接收缓冲。
    ///
    /// - `stream` 在缓冲用途尚未与具体流关联时（例如解复用前的预读）为 `None`；
    /// - 返回的缓冲必须非空，长度可大于或小于 `size_hint`，以实现方便为准。
    ///
    /// 默认实现按提示长度分配一块清零缓冲。
    fn alloc_recv_buffer(&self, stream: Option<&Stream>, size_hint: usize) -> BytesMut {
        let _ = stream;
        BytesMut::zeroed(size_hint.max(1))
    }

    /// 对端开启了一条新流。
    ///
    /// 实现必须在本回调的调用栈内把 `token` 原样交给
    /// `transport.init_stream(Some(token))` 完成受理（或丢弃凭证以拒绝），
    /// 且不得对传输发起任何其他调用。
    fn accept_stream(&self, transport: &dyn Transport, token: AcceptToken);

    /// 投递一个入站操作批次，`ops` 中所有缓冲的所有权移交给实现方。
    ///
    /// `final_state` 是截至本批次最后一个操作时的流状态，也是上层感知
    /// 流生命周期的唯一渠道。若为 [`StreamState::Closed`]，上层应安排
    /// 在本回调之外调用 [`Transport::destroy_stream`]。
    fn recv_batch(&self, stream: &Stream, ops: Vec<StreamOp>, final_state: StreamState);

    /// 收到对端的 goaway 告知。不中止任何流。
    fn goaway(&self, status: StatusCode, debug: Bytes);

    /// 传输已完全关闭，此后不会再有任何针对它的上行回调。
    fn closed(&self, transport: TransportId);
}
