//! 流操作与批量模型。
//!
//! 一个批次是调用方构造的有序操作序列；批次中引用的全部缓冲随提交一起
//! 移交所有权——发送时移交给传输，接收时移交给上层，提交方此后不得再触碰。

use alloc::string::String;
use bytes::Bytes;

/// 批次中的单个流操作。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“数据、元数据、半关闭”统一进一个枚举，使批次成为单一的有序载体，
///   传输实现只需按序消费即可保证单流内的操作次序；
/// - 缓冲采用 [`Bytes`] 的引用计数移动语义：跨层传递零拷贝，释放责任随值转移。
///
/// ## 契约说明（What）
/// - `Data`：一段不透明的消息字节；
/// - `Metadata`：一条出站控制元数据（键值对）；
/// - `HalfClose`：本端发送方向的关闭信号，等价于批次级 `is_last` 标记，
///   其后同一流上不得再提交任何出站操作；
/// - 入站投递复用同一枚举，但半关闭不会以操作形式出现，而是折叠进
///   投递的 `final_state` 字段。
///
/// ## 风险提示（Trade-offs）
/// - 枚举不携带协议级编码信息（帧边界、压缩标志等），这些属于具体线缆协议。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOp {
    /// 一段不透明的消息数据。
    Data(Bytes),
    /// 一条控制元数据。
    Metadata(MetadataItem),
    /// 出站方向半关闭信号。
    HalfClose,
}

impl StreamOp {
    /// 构造数据操作。
    pub fn data(payload: impl Into<Bytes>) -> Self {
        StreamOp::Data(payload.into())
    }

    /// 构造元数据操作。
    pub fn metadata(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        StreamOp::Metadata(MetadataItem {
            key: key.into(),
            value: value.into(),
        })
    }

    /// 该操作计入流量窗口的字节数。仅数据消耗窗口。
    pub fn window_cost(&self) -> usize {
        match self {
            StreamOp::Data(payload) => payload.len(),
            _ => 0,
        }
    }

    /// 是否为半关闭信号。
    pub fn is_half_close(&self) -> bool {
        matches!(self, StreamOp::HalfClose)
    }
}

/// 一条控制元数据键值对。
///
/// 键为可读标识，值为不透明字节；解释权属于上层调用面与具体协议。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataItem {
    /// 元数据键。
    pub key: String,
    /// 元数据值。
    pub value: Bytes,
}

#[cfg(test)]
mod tests {
    use super::StreamOp;

    #[test]
    fn only_data_costs_window() {
        assert_eq!(StreamOp::data("hello").window_cost(), 5);
        assert_eq!(StreamOp::metadata("k", "v").window_cost(), 0);
        assert_eq!(StreamOp::HalfClose.window_cost(), 0);
    }
}
