//! 传输核心契约。

use alloc::boxed::Box;
use alloc::vec::Vec;
use bytes::Bytes;

use crate::{AcceptToken, AdmitError, StatusCode, Stream, StreamOp, TransportId};

/// Ping 响应的完成回调。
///
/// 传输可能在持有内部锁的情况下触发完成，因此回调内不得同步调用回传输；
/// 需要回调传输的实现应将动作推迟到独立的执行上下文。
pub type PingCompletion = Box<dyn FnOnce() + Send + 'static>;

/// 外部就绪源的不透明登记目标。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - I/O 就绪与事件循环基底不属于本契约的设计范围：传输只需向其登记自身，
///   调度细节由基底自行决定；
/// - 以最小接口消费，避免契约层对任何具体事件循环产生依赖。
///
/// ## 契约说明（What）
/// - `register`：声明某个传输对该就绪源产生兴趣；重复登记应幂等。
pub trait Pollset: Send + Sync {
    /// 登记一个传输。
    fn register(&self, transport: TransportId);
}

/// 传输核心：一条连接之上多条逻辑流的生命周期权威。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 上层调用面只通过这张接口表驱动流：提交批次、控制窗口、发起连接级操作；
///   具体线缆协议（成帧、编解码、握手）全部隐藏在实现之内；
/// - 流生命周期状态的唯一真相渠道是上行投递中的 `final_state` 字段，
///   本接口不提供任何旁路查询，以免两条渠道出现分歧。
///
/// ## 架构定位（Architecture）
/// - 每个实例代表一条连接（或类连接通道），由创建者（客户端通道或服务端）持有；
/// - 实现内部持有活跃流的权威映射表；流状态的变更只能由网络事件与
///   本接口的四个流入口（`init_stream`、`send_batch`、`abort_stream`、
///   `destroy_stream`）驱动。
///
/// ## 并发模型（How）
/// - 出站入口可从任意调用方线程发起；同一条流的 `send_batch` 必须由调用方
///   自行串行，传输保证不重排单流的出站批次；
/// - 入站投递经由实现内部的派发队列串行执行，保证同流投递按到达序呈现、
///   `Closed` 必为最后一次投递；
/// - 任何接口操作都不会因网络 I/O 阻塞调用方；异步效果（Ping 响应、
///   受理、建立完成）一律经回调通知。
///
/// ## 契约违例（Trade-offs）
/// - 在观察到 `Closed` 投递之前销毁流、在半关闭之后继续提交批次、
///   用已销毁的句柄调用任何入口，均为编程错误：实现以断言失败（panic）
///   暴露，不作为可恢复错误处理。
pub trait Transport: Send + Sync + 'static {
    /// 本传输的进程内标识。
    fn id(&self) -> TransportId;

    /// 单条流的传输私有状态所占字节数。
    ///
    /// 该值在传输整个生命周期内保持稳定，供调用方做容量规划与观测。
    fn stream_storage_size(&self) -> usize;

    /// 初始化一条新流。
    ///
    /// - `server_data` 为 `None` 表示本端主动开流；为 `Some(token)` 表示
    ///   受理对端开流，凭证必须来自本传输此前的
    ///   [`accept_stream`](crate::TransportCallbacks::accept_stream) 回调；
    /// - 失败时调用方不持有任何已初始化的存储，可重试或向上汇报；
    /// - 成功返回的句柄是后续所有流操作的唯一凭据。
    fn init_stream(&self, server_data: Option<AcceptToken>) -> Result<Stream, AdmitError>;

    /// 销毁一条流的传输私有资源。
    ///
    /// 前置条件：调用方已经通过某次投递观察到该流 `final_state == Closed`。
    /// 本调用不得与该流的投递处于同一调用栈——实现的派发队列保证投递侧
    /// 不会反向触碰销毁，调用方则不得在 `recv_batch` 回调内发起销毁。
    fn destroy_stream(&self, stream: Stream);

    /// 切换流量控制门。
    ///
    /// `allow = false` 停止为该流通告新的接收窗口，但不回收已授予的窗口：
    /// 既有窗口允许的数据仍会到达并被投递。`allow = true` 恢复通告，
    /// 期间积压的窗口一次性补发，不丢失数据。
    fn set_allow_window_updates(&self, stream: &Stream, allow: bool);

    /// 提交一个出站批次，移交其中全部缓冲的所有权。
    ///
    /// `is_last = true` 标记这是该流出站方向的终结批次，效果等同于批次末尾
    /// 附带 [`StreamOp::HalfClose`]。不同流的提交可以并发；同一条流的提交
    /// 必须由调用方串行。
    fn send_batch(&self, stream: &Stream, ops: Vec<StreamOp>, is_last: bool);

    /// 发起连接级存活探测。
    ///
    /// `completion` 在观察到响应时恰好触发一次；若传输在响应前关闭，
    /// 允许不触发（零次或一次）。触发时可能持有传输内部锁，回调内
    /// 不得同步调用回传输。
    fn ping(&self, completion: PingCompletion);

    /// 立即终止一条流的收发。
    ///
    /// 无论真实网络状态如何，本地都保证仍会产生一次零操作、
    /// `final_state == Closed` 的终结投递，使上层的完成契约保持统一。
    fn abort_stream(&self, stream: &Stream, status: StatusCode);

    /// 向外部就绪源登记本传输。
    fn add_to_pollset(&self, pollset: &dyn Pollset);

    /// 告知对端连接即将终止。
    ///
    /// 仅为告知：不中止任何活跃流，各流继续走各自的自然或显式关闭路径。
    fn goaway(&self, status: StatusCode, debug: Bytes);

    /// 关闭传输：中止所有尚未终结的流（逐流兑现 `Closed` 终结投递），
    /// 此后不再受理新流，最终触发一次
    /// [`closed`](crate::TransportCallbacks::closed) 上行回调。幂等。
    ///
    /// 传输对象的最终释放由 `Drop` 承担，释放前应先完成关闭。
    fn close(&self);
}
