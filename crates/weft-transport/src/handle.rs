//! 传输与流的不透明句柄。
//!
//! 流私有状态由传输内部按流标识索引的竞技场记录承载：调用方只持有
//! 轻量句柄，`stream_storage_size` 作为传输的固定能力汇报记录尺寸。

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// 传输实例的进程内唯一标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

impl TransportId {
    /// 分配一个新的传输标识。进程内单调递增，不复用。
    pub fn allocate() -> Self {
        TransportId(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

/// 传输分配的流标识。仅在所属传输范围内唯一。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// 由传输实现构造流标识。
    pub const fn new(raw: u64) -> Self {
        StreamId(raw)
    }

    /// 返回原始数值，供传输实现做奇偶划分或日志输出。
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// 单条逻辑流的调用方句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 上层需要一个可哈希、可克隆的轻量值来索引“这条流”，而流的真实状态
///   完全由传输私有；句柄把两者解耦；
/// - 句柄只能经由 [`Transport::init_stream`](crate::transport::Transport::init_stream)
///   铸造，因此“对同一块存储重复初始化”在构造上不可能发生。
///
/// ## 契约说明（What）
/// - 句柄自身不承载任何资源；真正的释放动作是把句柄按值交还给
///   [`Transport::destroy_stream`](crate::transport::Transport::destroy_stream)；
/// - 释放之后仍残留的克隆即为悬垂句柄，用其调用任何传输入口属于契约违例。
///
/// ## 风险提示（Trade-offs）
/// - 为了让传输在上行投递中引用同一条流，句柄必须可克隆；克隆带来的
///   悬垂风险由契约违例断言兜底，而非类型系统。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Stream {
    transport: TransportId,
    id: StreamId,
}

impl Stream {
    /// 由传输实现铸造句柄。上层代码不应调用。
    pub const fn new(transport: TransportId, id: StreamId) -> Self {
        Stream { transport, id }
    }

    /// 所属传输标识。
    pub const fn transport_id(&self) -> TransportId {
        self.transport
    }

    /// 流标识。
    pub const fn id(&self) -> StreamId {
        self.id
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transport, self.id)
    }
}

/// 对端新开流的受理凭证。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 受理路径要求上层在 `accept_stream` 回调内原样回传一个不透明参数给
///   `init_stream`；凭证类型使这条通路有类型保障且单次使用（不可克隆）；
/// - 凭证记录铸造它的传输标识，跨传输误用会被受理方识别为契约违例。
///
/// ## 契约说明（What）
/// - 凭证只能在铸造它的 `accept_stream` 回调所在调用栈内，经
///   `init_stream(Some(token))` 消费一次；
/// - 丢弃凭证等价于拒绝该流，由传输的受理失败路径善后。
pub struct AcceptToken {
    transport: TransportId,
    stream: StreamId,
}

impl AcceptToken {
    /// 由传输实现铸造凭证。上层代码不应调用。
    pub const fn new(transport: TransportId, stream: StreamId) -> Self {
        AcceptToken { transport, stream }
    }

    /// 铸造该凭证的传输标识。
    pub const fn transport_id(&self) -> TransportId {
        self.transport
    }

    /// 凭证指向的流标识。
    pub const fn stream_id(&self) -> StreamId {
        self.stream
    }
}

impl fmt::Debug for AcceptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptToken")
            .field("transport", &self.transport)
            .field("stream", &self.stream)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::TransportId;

    #[test]
    fn transport_ids_are_unique() {
        let a = TransportId::allocate();
        let b = TransportId::allocate();
        assert_ne!(a, b);
    }
}
