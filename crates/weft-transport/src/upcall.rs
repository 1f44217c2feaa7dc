//! 上行回调派发队列：每传输一条，单排水者纪律。
//!
//! 契约禁止两类重入（受理回调反向触碰传输、销毁与投递同栈），
//! 与其依赖文档约定，不如让所有上行回调都经由本队列排队，
//! 由同一时刻至多一个排水者顺序执行——禁区从而在结构上不可进入。

use alloc::boxed::Box;
use alloc::collections::VecDeque;

use spin::Mutex;

/// 一次待执行的上行回调。
pub type Upcall = Box<dyn FnOnce() + Send + 'static>;

struct QueueInner {
    pending: VecDeque<Upcall>,
    draining: bool,
}

/// 单传输范围的先进先出派发队列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 入站投递、受理、goaway、closed 与延迟的 Ping 完成都从这里流向上层，
///   先进先出保证了“同流投递按到达序呈现、`Closed` 殿后”的次序契约；
/// - 单排水者意味着回调永远不在传输状态锁之下执行：排水循环取出元素后
///   先释放队列锁再运行回调。
///
/// ## 执行模型（How）
/// - `enqueue` 仅入队，可在持有任意外部锁时调用（内部只有短临界区自旋锁）；
/// - `drain` 尝试成为排水者：若已有排水者在工作则立即返回，元素留给对方；
/// - 回调执行期间向同一队列继续入队是允许的，新元素由当前排水者顺带处理。
///
/// ## 风险提示（Trade-offs）
/// - 排水发生在最后一个触发动作的调用方线程上，回调的执行成本由该线程
///   承担；对实时性敏感的实现可以把 `drain` 交给专职线程。
pub struct UpcallQueue {
    inner: Mutex<QueueInner>,
}

impl UpcallQueue {
    /// 构造空队列。
    pub const fn new() -> Self {
        UpcallQueue {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                draining: false,
            }),
        }
    }

    /// 仅入队，不排水。适用于仍持有外部状态锁的调用点。
    pub fn enqueue(&self, upcall: Upcall) {
        self.inner.lock().pending.push_back(upcall);
    }

    /// 尝试排空队列。同一时刻至多一个排水者；竞争失败立即返回。
    pub fn drain(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.draining {
                return;
            }
            inner.draining = true;
        }
        loop {
            let next = {
                let mut inner = self.inner.lock();
                match inner.pending.pop_front() {
                    Some(upcall) => Some(upcall),
                    None => {
                        inner.draining = false;
                        None
                    }
                }
            };
            match next {
                Some(upcall) => upcall(),
                None => break,
            }
        }
    }

    /// 入队并立即尝试排水。
    pub fn dispatch(&self, upcall: Upcall) {
        self.enqueue(upcall);
        self.drain();
    }

    /// 当前积压的回调数量。
    pub fn backlog(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl Default for UpcallQueue {
    fn default() -> Self {
        UpcallQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::UpcallQueue;
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use spin::Mutex;

    #[test]
    fn fifo_order_is_preserved() {
        let queue = UpcallQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let seen = Arc::clone(&seen);
            queue.enqueue(Box::new(move || seen.lock().push(i)));
        }
        queue.drain();
        assert_eq!(*seen.lock(), [0, 1, 2, 3]);
        assert_eq!(queue.backlog(), 0);
    }

    #[test]
    fn reentrant_dispatch_runs_after_current_upcall() {
        let queue = Arc::new(UpcallQueue::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_queue = Arc::clone(&queue);
        let inner_seen = Arc::clone(&seen);
        queue.dispatch(Box::new(move || {
            inner_seen.lock().push("outer");
            let nested_seen = Arc::clone(&inner_seen);
            // 回调内继续派发：当前排水者顺带处理，而不是递归执行。
            inner_queue.dispatch(Box::new(move || nested_seen.lock().push("inner")));
            inner_seen.lock().push("outer-end");
        }));

        assert_eq!(*seen.lock(), ["outer", "outer-end", "inner"]);
    }

    #[cfg(feature = "std")]
    #[test]
    fn concurrent_dispatch_executes_every_upcall_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let queue = Arc::new(UpcallQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let counter = Arc::clone(&counter);
                    queue.dispatch(Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        queue.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 800);
    }
}
