//! RPC 风格的状态码域。
//!
//! 状态码由传输层与上层调用面共享：`abort_stream`、`goaway` 等控制操作
//! 以状态码描述终止原因，具体线缆协议负责将其映射到线上表示。

/// 与上层调用面共享的状态码枚举。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输层的流中止与连接终止需要一套稳定的原因分类，使日志、指标与上层
///   重试策略能够对齐语义，而不是各自解析字符串；
/// - 枚举刻意保持与主流 RPC 生态一致的划分，便于具体协议实现做一对一映射。
///
/// ## 契约说明（What）
/// - `Ok` 表示正常完结；其余变体均为异常终止原因；
/// - 变体集合是封闭的：新增原因属于破坏性升级，需要同步修订所有协议映射。
///
/// ## 风险提示（Trade-offs）
/// - 本层不定义“哪个状态码可重试”，该判定属于上层调用面的策略范畴。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 正常完成。
    Ok,
    /// 操作被调用方取消。
    Cancelled,
    /// 未知错误。
    Unknown,
    /// 参数非法。
    InvalidArgument,
    /// 截止时间已过。
    DeadlineExceeded,
    /// 目标不存在。
    NotFound,
    /// 目标已存在。
    AlreadyExists,
    /// 权限不足。
    PermissionDenied,
    /// 资源耗尽（配额、并发上限等）。
    ResourceExhausted,
    /// 前置条件不满足。
    FailedPrecondition,
    /// 操作被中止（并发冲突、事务夭折等）。
    Aborted,
    /// 超出有效范围。
    OutOfRange,
    /// 功能未实现。
    Unimplemented,
    /// 内部不变量被破坏。
    Internal,
    /// 服务当前不可用，稍后可能恢复。
    Unavailable,
    /// 数据不可恢复地损坏或丢失。
    DataLoss,
    /// 缺少有效的身份凭证。
    Unauthenticated,
}

impl StatusCode {
    /// 返回用于日志与追踪的稳定名称。
    pub const fn as_str(self) -> &'static str {
        match self {
            StatusCode::Ok => "ok",
            StatusCode::Cancelled => "cancelled",
            StatusCode::Unknown => "unknown",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::NotFound => "not_found",
            StatusCode::AlreadyExists => "already_exists",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::FailedPrecondition => "failed_precondition",
            StatusCode::Aborted => "aborted",
            StatusCode::OutOfRange => "out_of_range",
            StatusCode::Unimplemented => "unimplemented",
            StatusCode::Internal => "internal",
            StatusCode::Unavailable => "unavailable",
            StatusCode::DataLoss => "data_loss",
            StatusCode::Unauthenticated => "unauthenticated",
        }
    }

    /// 是否表示正常完成。
    pub const fn is_ok(self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

impl core::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
