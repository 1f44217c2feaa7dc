//! 契约层错误域。
//!
//! 仅流准入失败属于可恢复错误；契约违例（提前销毁、回调内重入等）
//! 一律视为编程错误，以断言而非错误值暴露。

use thiserror::Error;

/// 流准入失败的原因。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - `init_stream` 是契约中唯一会以可恢复错误拒绝调用方的入口：准入失败后
///   调用方不持有任何已初始化的流存储，可以自行重试或向上汇报调用级失败；
/// - 细分原因使上层能够区分“稍后重试”（容量耗尽）与“换连接重试”（关闭/排空）。
///
/// ## 契约说明（What）
/// - `Exhausted`：并发流数量达到传输配置的上限；
/// - `Closing`：传输已关闭或正在关闭，不再受理新流；
/// - `Draining`：已收到对端 goaway，本端不应再向其开启新流。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AdmitError {
    /// 并发流容量耗尽。
    #[error("stream capacity exhausted (limit {limit})")]
    Exhausted {
        /// 传输配置的并发流上限。
        limit: usize,
    },
    /// 传输正在关闭。
    #[error("transport is closing, new streams are not admitted")]
    Closing,
    /// 收到 goaway 后进入排空阶段。
    #[error("transport is draining after goaway, new streams are not admitted")]
    Draining,
}
