//! Ping 台账：登记探测、匹配响应，保证完成回调至多触发一次。

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::PingCompletion;

/// 单次探测的标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PingId(u64);

/// 存活探测的登记与结算台账。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - “恰好一次完成”的保证需要一个原子的登记/摘除点：响应到达、连接关闭、
///   重复响应三条路径都在同一张表上竞争，台账用互斥表把竞争收敛为
///   一次 `remove` 的成败；
/// - 作为契约层构件提供，任何具体协议的 Ping 帧处理都可以复用。
///
/// ## 契约说明（What）
/// - `register`：登记完成回调，返回本次探测的标识；
/// - `settle`：按标识摘除回调。同一标识只有第一次调用能取回回调，
///   之后始终返回 `None`——重复响应天然被吸收；
/// - `drain`：摘除全部未结算回调（连接关闭路径），由调用方决定丢弃或触发。
///
/// ## 风险提示（Trade-offs）
/// - 台账只负责匹配，不触发回调：触发时机与执行上下文（是否持锁）
///   由传输实现掌握，推荐经派发队列延迟执行。
pub struct PingLedger {
    next: AtomicU64,
    pending: Mutex<BTreeMap<u64, PingCompletion>>,
}

impl PingLedger {
    /// 构造空台账。
    pub const fn new() -> Self {
        PingLedger {
            next: AtomicU64::new(1),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// 登记一次探测，返回其标识。
    pub fn register(&self, completion: PingCompletion) -> PingId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(id, completion);
        PingId(id)
    }

    /// 结算一次探测。仅首次结算取回回调。
    pub fn settle(&self, id: PingId) -> Option<PingCompletion> {
        self.pending.lock().remove(&id.0)
    }

    /// 摘除全部未结算的回调。
    pub fn drain(&self) -> Vec<PingCompletion> {
        let mut pending = self.pending.lock();
        let drained = core::mem::take(&mut *pending);
        drained.into_values().collect()
    }

    /// 当前未结算的探测数。
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for PingLedger {
    fn default() -> Self {
        PingLedger::new()
    }
}

#[cfg(test)]
mod tests {
    use super::PingLedger;
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn counting_completion(counter: &Arc<AtomicUsize>) -> crate::PingCompletion {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn settle_is_at_most_once() {
        let ledger = PingLedger::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = ledger.register(counting_completion(&counter));

        let first = ledger.settle(id);
        assert!(first.is_some());
        first.unwrap()();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // 重复响应被吸收。
        assert!(ledger.settle(id).is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drain_removes_everything() {
        let ledger = PingLedger::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let a = ledger.register(counting_completion(&counter));
        let _b = ledger.register(counting_completion(&counter));
        assert_eq!(ledger.pending_len(), 2);

        let drained = ledger.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(ledger.pending_len(), 0);
        assert!(ledger.settle(a).is_none());
    }
}
