//! 流生命周期状态机。
//!
//! 状态迁移只沿偏序 `Open < {SendClosed, RecvClosed} < Closed` 前进，
//! 上层唯一的观察渠道是批量投递上行回调中的 `final_state` 字段。

/// 单条流的收发关闭状态。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将“半关闭”语义建模为显式状态而非两个布尔位，使非法组合在类型层面不可表达；
/// - 上层据此判断流是否可以继续提交出站批次，以及何时允许回收流存储。
///
/// ## 契约说明（What）
/// - 迁移关系：`Open → SendClosed`（本端半关闭）、`Open → RecvClosed`（对端半关闭）、
///   两个半关闭态在互补方向关闭或中止时进入 `Closed`；
/// - `Closed` 为终态：一旦某次投递携带 `Closed`，该流不会再有任何投递；
/// - 上层观察到 `Closed` 之后（且仅在此之后）才允许调用
///   [`Transport::destroy_stream`](crate::transport::Transport::destroy_stream)。
///
/// ## 风险提示（Trade-offs）
/// - 状态本身不携带终止原因；原因经由控制操作的状态码与日志渠道表达。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// 收发均开放。
    Open,
    /// 发送方向已关闭，仍可接收。
    SendClosed,
    /// 接收方向已关闭，仍可发送。
    RecvClosed,
    /// 收发均已关闭，终态。
    Closed,
}

impl StreamState {
    /// 本端半关闭后的新状态。已关闭发送方向时保持不变。
    pub const fn close_send(self) -> StreamState {
        match self {
            StreamState::Open => StreamState::SendClosed,
            StreamState::RecvClosed => StreamState::Closed,
            other => other,
        }
    }

    /// 对端半关闭后的新状态。已关闭接收方向时保持不变。
    pub const fn close_recv(self) -> StreamState {
        match self {
            StreamState::Open => StreamState::RecvClosed,
            StreamState::SendClosed => StreamState::Closed,
            other => other,
        }
    }

    /// 发送方向是否仍然开放。
    pub const fn can_send(self) -> bool {
        matches!(self, StreamState::Open | StreamState::RecvClosed)
    }

    /// 接收方向是否仍然开放。
    pub const fn can_recv(self) -> bool {
        matches!(self, StreamState::Open | StreamState::SendClosed)
    }

    /// 是否为终态。
    pub const fn is_closed(self) -> bool {
        matches!(self, StreamState::Closed)
    }

    /// 偏序中的层级：`Open` = 0，半关闭 = 1，`Closed` = 2。
    ///
    /// 投递序列的 `final_state` 层级必须单调不降，该值供状态机校验与测试使用。
    pub const fn rank(self) -> u8 {
        match self {
            StreamState::Open => 0,
            StreamState::SendClosed | StreamState::RecvClosed => 1,
            StreamState::Closed => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StreamState;

    #[test]
    fn half_close_paths_converge_on_closed() {
        assert_eq!(StreamState::Open.close_send(), StreamState::SendClosed);
        assert_eq!(StreamState::Open.close_recv(), StreamState::RecvClosed);
        assert_eq!(StreamState::SendClosed.close_recv(), StreamState::Closed);
        assert_eq!(StreamState::RecvClosed.close_send(), StreamState::Closed);
    }

    #[test]
    fn closed_is_absorbing() {
        assert_eq!(StreamState::Closed.close_send(), StreamState::Closed);
        assert_eq!(StreamState::Closed.close_recv(), StreamState::Closed);
        assert!(!StreamState::Closed.can_send());
        assert!(!StreamState::Closed.can_recv());
    }

    #[test]
    fn rank_is_monotone_along_transitions() {
        for state in [
            StreamState::Open,
            StreamState::SendClosed,
            StreamState::RecvClosed,
            StreamState::Closed,
        ] {
            assert!(state.close_send().rank() >= state.rank());
            assert!(state.close_recv().rank() >= state.rank());
        }
    }
}
