//! 被测传输的接入面。

use std::sync::Arc;

use weft_transport::{SetupCompletion, Transport, TransportSetup};

use crate::support::RecordingCallbacks;

/// 一对已互联、已挂接记录回调的被测端点。
pub struct TransportPair {
    /// 发起端。
    pub client: Arc<dyn Transport>,
    /// 受理端。
    pub server: Arc<dyn Transport>,
    /// 发起端的回调记录器。
    pub client_cb: Arc<RecordingCallbacks>,
    /// 受理端的回调记录器。
    pub server_cb: Arc<RecordingCallbacks>,
}

/// 由被测实现提供的构造入口。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 套件本身不知道传输怎样建立；实现方通过本 trait 注入"造一对端点"
///   的能力，其余全部断言逻辑即可复用。
///
/// ## 契约（What）
/// - `establish` 返回时两端已可用：任一端 `init_stream` 应立即生效；
/// - `establish_tuned` 以给定的初始窗口与并发流上限建立，供流量与
///   准入用例制造边界条件；
/// - `setup` 返回建立策略句柄，完成通路接到给定的两个完成器上。
pub trait TransportFactory: Sync {
    /// 以实现的默认参数建立一对端点。
    fn establish(&self) -> TransportPair;

    /// 以指定初始窗口与并发流上限建立一对端点。
    fn establish_tuned(&self, initial_window: usize, max_concurrent_streams: usize)
    -> TransportPair;

    /// 构造一个连接建立策略。
    fn setup(
        &self,
        initiator: Arc<dyn SetupCompletion>,
        acceptor: Arc<dyn SetupCompletion>,
    ) -> Arc<dyn TransportSetup>;
}
