//! 单条流的端内记录与窗口记账。

use std::collections::VecDeque;

use bytes::Bytes;
use weft_transport::{MetadataItem, StreamState};

/// 等待信用的出站操作。半关闭在入队时归一化为 `Fin` 标记。
pub(crate) enum ParkedOp {
    Data(Bytes),
    Metadata(MetadataItem),
    Fin,
}

/// 已获准流出、待投递给对端的片段。
pub(crate) enum Segment {
    Data(Bytes),
    Metadata(MetadataItem),
}

impl Segment {
    pub(crate) fn window_cost(&self) -> usize {
        match self {
            Segment::Data(payload) => payload.len(),
            Segment::Metadata(_) => 0,
        }
    }
}

/// 传输为一条流维护的私有状态。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 集中一条流的全部可变量：生命周期状态、流量门、发送信用、暂扣窗口
///   与待流出队列，使每个入口的加锁范围都落在同一条记录上；
/// - `closed_delivered` 在入队终结投递的瞬间置位，三条终止路径
///   （自然关闭、中止、连接关闭）在同一把连接锁下竞争它，
///   "`Closed` 恰好一次"由此成立。
///
/// ## 记账规则（What）
/// - `send_credit`：本端还可向对端发送的数据字节数；
/// - `withheld`：本端作为接收方已消费、但因流量门关闭而暂扣未回授的字节数；
/// - `parked`：信用不足时按序滞留的出站操作，先进先出；
/// - `sent_last`：出站方向的终结批次已提交，此后任何提交都是契约违例。
pub(crate) struct StreamRecord {
    pub state: StreamState,
    pub allow_window_updates: bool,
    pub send_credit: usize,
    pub withheld: usize,
    pub parked: VecDeque<ParkedOp>,
    pub sent_last: bool,
    pub closed_delivered: bool,
}

impl StreamRecord {
    pub(crate) fn new(initial_window: usize) -> Self {
        StreamRecord {
            state: StreamState::Open,
            allow_window_updates: true,
            send_credit: initial_window,
            withheld: 0,
            parked: VecDeque::new(),
            sent_last: false,
            closed_delivered: false,
        }
    }

    /// 按信用冲刷待流出队列。
    ///
    /// 返回获准流出的片段与本次是否冲出了半关闭标记。数据在信用边界上
    /// 切分：前半获准流出，剩余部分留在队首继续等待。
    pub(crate) fn flush_parked(&mut self) -> (Vec<Segment>, bool) {
        let mut out = Vec::new();
        let mut fin = false;
        while let Some(front) = self.parked.pop_front() {
            match front {
                ParkedOp::Data(mut payload) => {
                    if payload.len() <= self.send_credit {
                        self.send_credit -= payload.len();
                        out.push(Segment::Data(payload));
                    } else if self.send_credit == 0 {
                        self.parked.push_front(ParkedOp::Data(payload));
                        break;
                    } else {
                        let head = payload.split_to(self.send_credit);
                        self.send_credit = 0;
                        out.push(Segment::Data(head));
                        self.parked.push_front(ParkedOp::Data(payload));
                        break;
                    }
                }
                ParkedOp::Metadata(item) => out.push(Segment::Metadata(item)),
                ParkedOp::Fin => {
                    self.state = self.state.close_send();
                    fin = true;
                }
            }
        }
        (out, fin)
    }
}

#[cfg(test)]
mod tests {
    use super::{ParkedOp, Segment, StreamRecord};
    use bytes::Bytes;
    use weft_transport::StreamState;

    #[test]
    fn flush_splits_data_on_credit_boundary() {
        let mut record = StreamRecord::new(4);
        record
            .parked
            .push_back(ParkedOp::Data(Bytes::from_static(b"abcdef")));
        record.parked.push_back(ParkedOp::Fin);

        let (segments, fin) = record.flush_parked();
        assert_eq!(segments.len(), 1);
        match &segments[0] {
            Segment::Data(payload) => assert_eq!(&payload[..], b"abcd"),
            _ => panic!("expected data segment"),
        }
        assert!(!fin, "半关闭必须排在剩余数据之后");
        assert_eq!(record.send_credit, 0);

        // 信用补足后剩余数据连同半关闭一起冲出。
        record.send_credit = 16;
        let (segments, fin) = record.flush_parked();
        assert_eq!(segments.len(), 1);
        assert!(fin);
        assert_eq!(record.state, StreamState::SendClosed);
        assert!(record.parked.is_empty());
    }

    #[test]
    fn metadata_does_not_consume_credit() {
        let mut record = StreamRecord::new(0);
        record.parked.push_back(ParkedOp::Metadata(
            weft_transport::MetadataItem {
                key: "k".into(),
                value: Bytes::from_static(b"v"),
            },
        ));
        let (segments, fin) = record.flush_parked();
        assert_eq!(segments.len(), 1);
        assert!(!fin);
        assert_eq!(record.send_credit, 0);
    }
}
