//! 异步连接建立（Transport Setup）契约。
//!
//! 每个客户端通道持有一个 Setup 实例；建立成功产出一个活跃的传输核心
//! 与其绑定的上行回调表。

use alloc::sync::Arc;

use crate::{Transport, TransportCallbacks};

/// 建立完成的通知通路，在 Setup 构造时约定。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 建立成功的瞬间需要完成两件事：把新传输交给上层，并从上层取回
///   绑定到该传输的回调表。单一方法让两者原子地发生，不存在
///   “有传输无回调”的中间窗口；
/// - 上层要携带的任何私有状态由实现自身捕获，随回调表一起回流。
///
/// ## 契约说明（What）
/// - 每次成功建立调用一次；返回的回调表自此承接该传输的全部上行回调。
pub trait SetupCompletion: Send + Sync + 'static {
    /// 交付新建立的传输，换取与之绑定的回调表。
    fn transport_ready(&self, transport: Arc<dyn Transport>) -> Arc<dyn TransportCallbacks>;
}

/// 异步、可取消的连接建立策略。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“解析、连接、握手”整个过程抽象成一个与具体网络技术无关的句柄，
///   客户端通道只关心两个动作：发起与取消；
/// - 持续监测型实现（例如订阅名字服务）可以把 `initiate` 实现为空操作。
///
/// ## 契约说明（What）
/// - `initiate`：开始（或重申）建立，允许调用零次或多次；成功时经
///   构造时约定的 [`SetupCompletion`] 通路产出传输；
/// - `cancel`：终结操作。返回之后不会再创建新传输，所有在途的完成回调
///   要么已经触发完毕、要么保证不再触发；可安全地作为句柄的销毁调用。
///
/// ## 风险提示（Trade-offs）
/// - `cancel` 的“返回即静默”保证要求实现把完成通路置于互斥保护之下；
///   取消方会被在途的完成短暂阻塞，这是换取硬保证的代价。
pub trait TransportSetup: Send + Sync + 'static {
    /// 发起连接建立。持续监测型实现可为空操作。
    fn initiate(&self);

    /// 取消连接建立。返回后不再有任何完成回调触发。
    fn cancel(&self);
}
