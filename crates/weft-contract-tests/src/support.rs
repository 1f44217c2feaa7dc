//! 套件公共设施：回调记录器、完成记录器与带上下文的失败重抛。

use std::fmt::Write;
use std::panic;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};
use weft_transport::{
    AcceptToken, Pollset, SetupCompletion, StatusCode, Stream, StreamOp, StreamState, Transport,
    TransportCallbacks, TransportId,
};

/// 等待上行回调的统一超时。超过即判定契约未兑现。
const WAIT_BUDGET: Duration = Duration::from_secs(5);

/// 在附加“套件/用例”上下文后重新抛出 panic。
pub fn panic_with_context(suite: &str, case: &str, payload: Box<dyn std::any::Any + Send>) -> ! {
    let mut message = String::new();
    let _ = write!(&mut message, "[weft-tck::{suite}::{case}] 测试失败：");
    if let Some(text) = payload.downcast_ref::<&str>() {
        let _ = write!(&mut message, "{text}");
    } else if let Some(text) = payload.downcast_ref::<String>() {
        let _ = write!(&mut message, "{text}");
    } else {
        let _ = write!(&mut message, "<未知 panic 类型>");
    }
    panic::resume_unwind(Box::new(message));
}

/// 轮询等待计数器达到期望值，超时即 panic。
pub fn wait_counter(counter: &std::sync::atomic::AtomicUsize, expected: usize, what: &str) {
    let deadline = std::time::Instant::now() + WAIT_BUDGET;
    loop {
        let current = counter.load(std::sync::atomic::Ordering::SeqCst);
        if current == expected {
            return;
        }
        if std::time::Instant::now() >= deadline {
            panic!("等待 {what} 超时：期望 {expected}，实际 {current}");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// 一次被记录的上行回调。
#[derive(Clone, Debug)]
pub enum UpcallRecord {
    /// `accept_stream` 成功受理的流。
    Accepted { stream: Stream },
    /// 一次 `recv_batch` 投递。
    Batch {
        stream: Stream,
        ops: Vec<StreamOp>,
        final_state: StreamState,
    },
    /// 一次 goaway 告知。
    Goaway { status: StatusCode, debug: Bytes },
    /// 传输关闭通知。
    TransportClosed { transport: TransportId },
}

/// 受理回调的处置策略。
#[derive(Clone, Copy, Debug)]
pub enum AcceptPolicy {
    /// 在回调栈内用凭证完成受理。
    Admit,
    /// 丢弃凭证以拒绝该流。
    Reject,
}

/// 记录全部上行回调并支持按条件等待的回调表。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 契约的大多数断言都形如"某个上行回调最终以某种形态到达"；
///   把记录与条件等待做成一个可复用的回调表，用例只写谓词。
///
/// ## 逻辑（How）
/// - 每次回调在日志尾部追加一条记录并唤醒全部等待者；等待方持日志锁
///   轮询谓词，超过 [`WAIT_BUDGET`] 仍未满足即 panic；
/// - 受理策略与接收缓冲容量皆可在运行中调整，以制造拒绝与分块场景。
pub struct RecordingCallbacks {
    log: Mutex<Vec<UpcallRecord>>,
    arrived: Condvar,
    accept_policy: Mutex<AcceptPolicy>,
    recv_buffer_cap: Mutex<Option<usize>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingCallbacks {
            log: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
            accept_policy: Mutex::new(AcceptPolicy::Admit),
            recv_buffer_cap: Mutex::new(None),
        })
    }

    /// 调整后续 `accept_stream` 回调的处置策略。
    pub fn set_accept_policy(&self, policy: AcceptPolicy) {
        *self.accept_policy.lock() = policy;
    }

    /// 限定后续接收缓冲的容量，迫使入站数据分块。`None` 恢复默认。
    pub fn set_recv_buffer_cap(&self, cap: Option<usize>) {
        *self.recv_buffer_cap.lock() = cap;
    }

    /// 当前日志的完整快照。
    pub fn snapshot(&self) -> Vec<UpcallRecord> {
        self.log.lock().clone()
    }

    fn record(&self, entry: UpcallRecord) {
        self.log.lock().push(entry);
        self.arrived.notify_all();
    }

    fn wait_until<T>(
        &self,
        what: &str,
        mut probe: impl FnMut(&[UpcallRecord]) -> Option<T>,
    ) -> T {
        let mut log = self.log.lock();
        loop {
            if let Some(found) = probe(&log) {
                return found;
            }
            if self.arrived.wait_for(&mut log, WAIT_BUDGET).timed_out() {
                panic!("等待 {what} 超时，已记录 {} 条回调", log.len());
            }
        }
    }

    /// 等待首条受理成功的流。
    pub fn wait_accepted(&self) -> Stream {
        self.wait_until("accept_stream", |log| {
            log.iter().find_map(|entry| match entry {
                UpcallRecord::Accepted { stream } => Some(stream.clone()),
                _ => None,
            })
        })
    }

    /// 等待指定流的 `Closed` 终结投递。
    pub fn wait_stream_closed(&self, stream: &Stream) {
        let target = stream.clone();
        self.wait_until("流终结投递", |log| {
            log.iter()
                .any(|entry| {
                    matches!(entry, UpcallRecord::Batch { stream, final_state, .. }
                        if *stream == target && final_state.is_closed())
                })
                .then_some(())
        });
    }

    /// 等待传输关闭通知。
    pub fn wait_transport_closed(&self) -> TransportId {
        self.wait_until("closed 通知", |log| {
            log.iter().find_map(|entry| match entry {
                UpcallRecord::TransportClosed { transport } => Some(*transport),
                _ => None,
            })
        })
    }

    /// 等待 goaway 告知。
    pub fn wait_goaway(&self) -> (StatusCode, Bytes) {
        self.wait_until("goaway 告知", |log| {
            log.iter().find_map(|entry| match entry {
                UpcallRecord::Goaway { status, debug } => Some((*status, debug.clone())),
                _ => None,
            })
        })
    }

    /// 等待指定流累计收到至少 `len` 字节数据。
    pub fn wait_data(&self, stream: &Stream, len: usize) -> Vec<u8> {
        let target = stream.clone();
        self.wait_until("入站数据", |log| {
            let got = collect_data(log, &target);
            (got.len() >= len).then_some(got)
        })
    }

    /// 指定流迄今收到的全部数据字节。
    pub fn received_data(&self, stream: &Stream) -> Vec<u8> {
        collect_data(&self.log.lock(), stream)
    }

    /// 指定流收到的 `Closed` 终态投递次数。
    pub fn closed_count(&self, stream: &Stream) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|entry| {
                matches!(entry, UpcallRecord::Batch { stream: s, final_state, .. }
                    if s == stream && final_state.is_closed())
            })
            .count()
    }

    /// 指定流每次投递的终态序列。
    pub fn final_states(&self, stream: &Stream) -> Vec<StreamState> {
        self.log
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                UpcallRecord::Batch {
                    stream: s,
                    final_state,
                    ..
                } if s == stream => Some(*final_state),
                _ => None,
            })
            .collect()
    }

    /// 取走指定流已投递的全部数据缓冲，日志中以空缓冲占位。
    ///
    /// 取出后记录器不再持有这些缓冲的引用，调用方可据此检验
    /// 传输侧是否也已放手（唯一持有）。
    pub fn take_data_payloads(&self, stream: &Stream) -> Vec<Bytes> {
        let mut log = self.log.lock();
        let mut out = Vec::new();
        for entry in log.iter_mut() {
            if let UpcallRecord::Batch { stream: s, ops, .. } = entry {
                if s == stream {
                    for op in ops.iter_mut() {
                        if let StreamOp::Data(payload) = op {
                            out.push(std::mem::take(payload));
                        }
                    }
                }
            }
        }
        out
    }

    /// 指定流每个入站数据操作的长度，按投递序排列。
    pub fn data_op_sizes(&self, stream: &Stream) -> Vec<usize> {
        self.log
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                UpcallRecord::Batch { stream: s, ops, .. } if s == stream => Some(
                    ops.iter()
                        .filter_map(|op| match op {
                            StreamOp::Data(payload) => Some(payload.len()),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                ),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

fn collect_data(log: &[UpcallRecord], stream: &Stream) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in log {
        if let UpcallRecord::Batch { stream: s, ops, .. } = entry {
            if s == stream {
                for op in ops {
                    if let StreamOp::Data(payload) = op {
                        out.extend_from_slice(payload);
                    }
                }
            }
        }
    }
    out
}

impl TransportCallbacks for RecordingCallbacks {
    fn alloc_recv_buffer(&self, _stream: Option<&Stream>, size_hint: usize) -> BytesMut {
        let cap = *self.recv_buffer_cap.lock();
        BytesMut::zeroed(cap.unwrap_or(size_hint).max(1))
    }

    fn accept_stream(&self, transport: &dyn Transport, token: AcceptToken) {
        match *self.accept_policy.lock() {
            AcceptPolicy::Admit => {
                if let Ok(stream) = transport.init_stream(Some(token)) {
                    self.record(UpcallRecord::Accepted { stream });
                }
            }
            AcceptPolicy::Reject => drop(token),
        }
    }

    fn recv_batch(&self, stream: &Stream, ops: Vec<StreamOp>, final_state: StreamState) {
        self.record(UpcallRecord::Batch {
            stream: stream.clone(),
            ops,
            final_state,
        });
    }

    fn goaway(&self, status: StatusCode, debug: Bytes) {
        self.record(UpcallRecord::Goaway { status, debug });
    }

    fn closed(&self, transport: TransportId) {
        self.record(UpcallRecord::TransportClosed { transport });
    }
}

/// 记录型建立完成器：保存交付的传输，回调表用 [`RecordingCallbacks`]。
pub struct RecordingCompletion {
    callbacks: Arc<RecordingCallbacks>,
    ready: Mutex<Vec<Arc<dyn Transport>>>,
}

impl RecordingCompletion {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingCompletion {
            callbacks: RecordingCallbacks::new(),
            ready: Mutex::new(Vec::new()),
        })
    }

    /// 与交付传输绑定的回调记录器。
    pub fn callbacks(&self) -> Arc<RecordingCallbacks> {
        Arc::clone(&self.callbacks)
    }

    /// 迄今完成交付的次数。
    pub fn ready_count(&self) -> usize {
        self.ready.lock().len()
    }

    /// 最近一次交付的传输。
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.ready.lock().last().cloned()
    }
}

impl SetupCompletion for RecordingCompletion {
    fn transport_ready(&self, transport: Arc<dyn Transport>) -> Arc<dyn TransportCallbacks> {
        self.ready.lock().push(transport);
        Arc::clone(&self.callbacks) as Arc<dyn TransportCallbacks>
    }
}

/// 记录注册事件的轮询集。
#[derive(Default)]
pub struct RecordingPollset {
    registered: Mutex<Vec<TransportId>>,
}

impl RecordingPollset {
    pub fn new() -> Self {
        RecordingPollset::default()
    }

    pub fn registered(&self) -> Vec<TransportId> {
        self.registered.lock().clone()
    }
}

impl Pollset for RecordingPollset {
    fn register(&self, transport: TransportId) {
        self.registered.lock().push(transport);
    }
}
