//! 流状态机性质验证。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：对 `StreamState` 四态沿偏序
//!   `Open < {SendClosed, RecvClosed} < Closed` 的单调性做性质验证：任意
//!   由“本端半关闭 / 对端半关闭 / 中止”组成的事件序列，驱动出的状态轨迹
//!   层级单调不降，且一旦到达 `Closed` 便不再离开。
//! - **设计手法 (How)**：用 proptest 生成随机事件序列，以影子状态机逐事件
//!   求值并记录轨迹；断言与生产转移函数（`close_send`/`close_recv`）共用
//!   同一语义，防止实现与契约各自漂移。
//! - **契约 (What)**：投递序列的 `final_state` 正是这条轨迹的采样，因此
//!   单调性与终态吸收性直接对应“`Closed` 至多一次且必为最后一次投递”。

use proptest::prelude::*;
use weft_transport::StreamState;

/// 驱动状态机的抽象事件。
#[derive(Clone, Copy, Debug)]
enum LifecycleEvent {
    /// 本端半关闭（终结批次或显式半关闭操作）。
    LocalHalfClose,
    /// 对端半关闭。
    RemoteHalfClose,
    /// 任一侧中止。
    Abort,
}

fn apply(state: StreamState, event: LifecycleEvent) -> StreamState {
    match event {
        LifecycleEvent::LocalHalfClose => state.close_send(),
        LifecycleEvent::RemoteHalfClose => state.close_recv(),
        LifecycleEvent::Abort => StreamState::Closed,
    }
}

fn event_strategy() -> impl Strategy<Value = LifecycleEvent> {
    prop_oneof![
        Just(LifecycleEvent::LocalHalfClose),
        Just(LifecycleEvent::RemoteHalfClose),
        Just(LifecycleEvent::Abort),
    ]
}

proptest! {
    /// 性质一：任意事件序列下层级单调不降。
    #[test]
    fn rank_never_decreases(events in proptest::collection::vec(event_strategy(), 0..32)) {
        let mut state = StreamState::Open;
        for event in events {
            let next = apply(state, event);
            prop_assert!(next.rank() >= state.rank(),
                "{:?} -> {:?} 违反单调性", state, next);
            state = next;
        }
    }

    /// 性质二：`Closed` 是吸收态，之后的任何事件都不再改变状态。
    #[test]
    fn closed_is_terminal(events in proptest::collection::vec(event_strategy(), 1..32)) {
        let mut state = StreamState::Open;
        let mut closed_at = None;
        for (index, event) in events.iter().enumerate() {
            state = apply(state, *event);
            if state.is_closed() && closed_at.is_none() {
                closed_at = Some(index);
            }
            if let Some(at) = closed_at {
                prop_assert!(state.is_closed(), "事件 {} 之后离开了终态", at);
            }
        }
    }

    /// 性质三：两个方向都关闭后必然处于 `Closed`。
    #[test]
    fn both_directions_closed_implies_closed(
        prefix in proptest::collection::vec(event_strategy(), 0..16),
    ) {
        let mut state = StreamState::Open;
        for event in prefix {
            state = apply(state, event);
        }
        let settled = state.close_send().close_recv();
        prop_assert!(settled.is_closed());
        prop_assert!(!settled.can_send());
        prop_assert!(!settled.can_recv());
    }
}
