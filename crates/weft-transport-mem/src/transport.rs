//! 内存传输端点：传输核心契约的进程内实现。

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, ThreadId};

use bytes::Bytes;
use parking_lot::Mutex;
use weft_transport::{
    AcceptToken, AdmitError, PingCompletion, PingLedger, Pollset, StatusCode, Stream, StreamId,
    StreamOp, StreamState, Transport, TransportCallbacks, TransportId, UpcallQueue,
};

use crate::fabric::{MemOptions, Role};
use crate::stream::{ParkedOp, Segment, StreamRecord};

/// 连接级生命周期阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    /// 正常运转。
    Active,
    /// 已向对端发出 goaway 告知。本端开流与既有流均不受限。
    GoawaySent,
    /// 收到对端 goaway，不再向其开启新流。
    Draining,
    /// 已关闭，不再受理任何新流。
    Closed,
}

pub(crate) struct ConnState {
    pub(crate) phase: Phase,
    closed_upcall_sent: bool,
    streams: BTreeMap<StreamId, StreamRecord>,
    next_stream: u64,
}

/// 单个端点的全部共享状态。
///
/// 对端以弱引用互联：成对端点之间不存在强引用环，任何一端被外界
/// 释放后，另一端的跨端操作自然退化为本端记账。
pub(crate) struct Inner {
    pub(crate) id: TransportId,
    pub(crate) role: Role,
    pub(crate) opts: MemOptions,
    pub(crate) conn: Mutex<ConnState>,
    pub(crate) queue: UpcallQueue,
    pub(crate) pings: PingLedger,
    pub(crate) peer: OnceLock<Weak<Inner>>,
    pub(crate) callbacks: OnceLock<Arc<dyn TransportCallbacks>>,
    delivering: Mutex<Option<ThreadId>>,
}

impl Inner {
    pub(crate) fn new(role: Role, opts: MemOptions) -> Self {
        Inner {
            id: TransportId::allocate(),
            role,
            opts,
            conn: Mutex::new(ConnState {
                phase: Phase::Active,
                closed_upcall_sent: false,
                streams: BTreeMap::new(),
                next_stream: role.first_stream_id(),
            }),
            queue: UpcallQueue::new(),
            pings: PingLedger::new(),
            peer: OnceLock::new(),
            callbacks: OnceLock::new(),
            delivering: Mutex::new(None),
        }
    }

    fn peer(&self) -> Option<Arc<Inner>> {
        self.peer.get().and_then(Weak::upgrade)
    }

    fn callbacks(&self) -> Option<Arc<dyn TransportCallbacks>> {
        self.callbacks.get().cloned()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let conn = self.conn.get_mut();
        if conn.phase != Phase::Closed {
            tracing::warn!(
                transport = %self.id,
                "transport dropped before close; resources released without a closed upcall"
            );
        }
    }
}

/// 投递调用栈守卫：记录当前正在执行 `recv_batch` 的线程。
///
/// `destroy_stream` 据此识别"销毁与投递同栈"的契约违例。
struct DeliveryGuard<'a> {
    inner: &'a Inner,
    prev: Option<ThreadId>,
}

impl<'a> DeliveryGuard<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let prev = inner.delivering.lock().replace(thread::current().id());
        DeliveryGuard { inner, prev }
    }
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        *self.inner.delivering.lock() = self.prev;
    }
}

/// 进程内传输端点的调用方句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 为上层提供可克隆的轻量入口，真实状态集中在内部共享结构中；
///   同一端点的多个句柄等价，生命周期由引用计数收敛。
///
/// ## 逻辑（How）
/// - 出站入口在连接锁内完成记账与效果收集（入队），释放锁后统一排水，
///   保证上行回调永远不在连接锁之下执行；
/// - 入站投递、受理、goaway、closed 与 Ping 完成全部经由本端派发队列
///   先进先出串行执行。
///
/// ## 契约（What）
/// - 完整实现 [`Transport`] 的全部语义，包括三条终止路径下
///   "`Closed` 终结投递恰好一次"的保证；
/// - 契约违例（悬垂句柄、半关闭后提交、提前销毁、投递栈内销毁）
///   以断言失败暴露。
#[derive(Clone)]
pub struct MemTransport {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for MemTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTransport")
            .field("id", &self.inner.id)
            .field("role", &self.inner.role)
            .finish()
    }
}

impl Transport for MemTransport {
    fn id(&self) -> TransportId {
        self.inner.id
    }

    fn stream_storage_size(&self) -> usize {
        mem::size_of::<StreamRecord>()
    }

    fn init_stream(&self, server_data: Option<AcceptToken>) -> Result<Stream, AdmitError> {
        let inner = &self.inner;
        let peer = inner.peer();
        let result = {
            let mut conn = inner.conn.lock();
            match conn.phase {
                Phase::Closed => Err(AdmitError::Closing),
                // 排空只拦截本端主动开流；受理对端已开启的流照常进行。
                Phase::Draining if server_data.is_none() => Err(AdmitError::Draining),
                _ if conn.streams.len() >= inner.opts.max_concurrent_streams => {
                    Err(AdmitError::Exhausted {
                        limit: inner.opts.max_concurrent_streams,
                    })
                }
                _ => match &server_data {
                    None => {
                        let sid = StreamId::new(conn.next_stream);
                        conn.next_stream += 2;
                        conn.streams
                            .insert(sid, StreamRecord::new(inner.opts.initial_window));
                        if let Some(peer) = &peer {
                            let acceptor = Arc::clone(peer);
                            peer.queue
                                .enqueue(Box::new(move || run_accept(acceptor, sid)));
                        }
                        Ok(Stream::new(inner.id, sid))
                    }
                    Some(token) => {
                        assert_eq!(
                            token.transport_id(),
                            inner.id,
                            "accept token was minted by a different transport"
                        );
                        let sid = token.stream_id();
                        conn.streams
                            .insert(sid, StreamRecord::new(inner.opts.initial_window));
                        Ok(Stream::new(inner.id, sid))
                    }
                },
            }
        };
        match &result {
            Ok(stream) => {
                tracing::debug!(transport = %inner.id, stream = %stream.id(), "stream admitted");
                if server_data.is_none() {
                    if let Some(peer) = &peer {
                        peer.queue.drain();
                    }
                }
            }
            Err(reason) => {
                tracing::debug!(transport = %inner.id, %reason, "stream admission refused");
                // 受理路径的准入失败要为对端的乐观记录善后。
                if let (Some(token), Some(peer)) = (&server_data, &peer) {
                    reset_remote(peer, token.stream_id());
                }
            }
        }
        result
    }

    fn destroy_stream(&self, stream: Stream) {
        let inner = &self.inner;
        assert_eq!(
            stream.transport_id(),
            inner.id,
            "stream handle from a different transport"
        );
        assert!(
            *inner.delivering.lock() != Some(thread::current().id()),
            "destroy_stream must not run in the same call stack as a delivery"
        );
        let sid = stream.id();
        let mut conn = inner.conn.lock();
        let Some(record) = conn.streams.get(&sid) else {
            panic!("destroy_stream on unknown or already destroyed stream {stream}");
        };
        assert!(
            record.closed_delivered && record.state.is_closed(),
            "destroy_stream before a CLOSED delivery was observed on {stream}"
        );
        conn.streams.remove(&sid);
        tracing::trace!(transport = %inner.id, stream = %sid, "stream storage released");
    }

    fn set_allow_window_updates(&self, stream: &Stream, allow: bool) {
        let inner = &self.inner;
        assert_eq!(
            stream.transport_id(),
            inner.id,
            "stream handle from a different transport"
        );
        let sid = stream.id();
        let grant = {
            let mut conn = inner.conn.lock();
            let Some(record) = conn.streams.get_mut(&sid) else {
                panic!("set_allow_window_updates on unknown or destroyed stream {stream}");
            };
            record.allow_window_updates = allow;
            if allow {
                mem::take(&mut record.withheld)
            } else {
                0
            }
        };
        if grant > 0 {
            if let Some(sender) = inner.peer() {
                grant_credit(&sender, sid, grant);
            }
        }
    }

    fn send_batch(&self, stream: &Stream, ops: Vec<StreamOp>, is_last: bool) {
        let inner = &self.inner;
        assert_eq!(
            stream.transport_id(),
            inner.id,
            "stream handle from a different transport"
        );
        let sid = stream.id();
        let peer = inner.peer();
        {
            let mut conn = inner.conn.lock();
            {
                let Some(record) = conn.streams.get_mut(&sid) else {
                    panic!("send_batch on unknown or destroyed stream {stream}");
                };
                if record.state.is_closed() {
                    // 流已在本端终结（中止或连接关闭）；终结投递在途，丢弃即可。
                    return;
                }
                assert!(
                    record.state.can_send() && !record.sent_last,
                    "send_batch after send direction closed on {stream}"
                );
                for op in ops {
                    assert!(
                        !record.sent_last,
                        "stream operation after half-close in a batch on {stream}"
                    );
                    match op {
                        StreamOp::Data(payload) => record.parked.push_back(ParkedOp::Data(payload)),
                        StreamOp::Metadata(item) => {
                            record.parked.push_back(ParkedOp::Metadata(item))
                        }
                        StreamOp::HalfClose => {
                            record.parked.push_back(ParkedOp::Fin);
                            record.sent_last = true;
                        }
                    }
                }
                if is_last && !record.sent_last {
                    record.parked.push_back(ParkedOp::Fin);
                    record.sent_last = true;
                }
            }
            stage_outbound(inner, peer.as_ref(), &mut conn, sid);
        }
        inner.queue.drain();
        if let Some(peer) = peer {
            peer.queue.drain();
        }
    }

    fn ping(&self, completion: PingCompletion) {
        let inner = &self.inner;
        if inner.conn.lock().phase == Phase::Closed {
            // 关闭后的探测允许零次完成。
            drop(completion);
            return;
        }
        let id = inner.pings.register(completion);
        tracing::trace!(transport = %inner.id, ping = ?id, "ping issued");
        let Some(peer) = inner.peer() else {
            return;
        };
        let responder = Arc::clone(&peer);
        peer.queue.dispatch(Box::new(move || {
            if responder.conn.lock().phase == Phase::Closed {
                return;
            }
            let Some(origin) = responder.peer() else {
                return;
            };
            let settle_on = Arc::clone(&origin);
            origin.queue.dispatch(Box::new(move || {
                if let Some(complete) = settle_on.pings.settle(id) {
                    complete();
                }
            }));
        }));
    }

    fn abort_stream(&self, stream: &Stream, status: StatusCode) {
        let inner = &self.inner;
        assert_eq!(
            stream.transport_id(),
            inner.id,
            "stream handle from a different transport"
        );
        let sid = stream.id();
        let peer = inner.peer();
        let already_terminal = {
            let mut conn = inner.conn.lock();
            let Some(record) = conn.streams.get_mut(&sid) else {
                panic!("abort_stream on unknown or destroyed stream {stream}");
            };
            if record.closed_delivered {
                true
            } else {
                record.state = StreamState::Closed;
                record.closed_delivered = true;
                record.sent_last = true;
                record.parked.clear();
                enqueue_local_terminal(inner, sid);
                false
            }
        };
        if !already_terminal {
            tracing::debug!(transport = %inner.id, stream = %sid, status = %status, "stream aborted");
            if let Some(peer) = &peer {
                reset_remote(peer, sid);
            }
        }
        inner.queue.drain();
    }

    fn add_to_pollset(&self, pollset: &dyn Pollset) {
        pollset.register(self.inner.id);
        tracing::trace!(transport = %self.inner.id, "registered with pollset");
    }

    fn goaway(&self, status: StatusCode, debug: Bytes) {
        let inner = &self.inner;
        tracing::info!(transport = %inner.id, status = %status, "goaway sent");
        {
            let mut conn = inner.conn.lock();
            if conn.phase == Phase::Active {
                conn.phase = Phase::GoawaySent;
            }
        }
        let Some(peer) = inner.peer() else {
            return;
        };
        {
            let mut conn = peer.conn.lock();
            // 双向 goaway 时排空语义占优：对端的准入限制仍要生效。
            if matches!(conn.phase, Phase::Active | Phase::GoawaySent) {
                conn.phase = Phase::Draining;
            }
        }
        let notified = Arc::clone(&peer);
        peer.queue.dispatch(Box::new(move || {
            if let Some(cb) = notified.callbacks() {
                cb.goaway(status, debug);
            }
        }));
    }

    fn close(&self) {
        let inner = &self.inner;
        tracing::info!(transport = %inner.id, "closing transport");
        shutdown_end(inner);
        if let Some(peer) = inner.peer() {
            shutdown_end(&peer);
        }
    }
}

/// 受理上行回调的实际执行体，运行在受理端的派发队列上。
fn run_accept(acceptor: Arc<Inner>, sid: StreamId) {
    if acceptor.conn.lock().phase == Phase::Closed {
        if let Some(initiator) = acceptor.peer() {
            reset_remote(&initiator, sid);
        }
        return;
    }
    let Some(cb) = acceptor.callbacks() else {
        return;
    };
    let transport = MemTransport {
        inner: Arc::clone(&acceptor),
    };
    cb.accept_stream(&transport, AcceptToken::new(acceptor.id, sid));
    // 上层拒绝（丢弃凭证或准入失败）时为开流端善后。
    let admitted = acceptor.conn.lock().streams.contains_key(&sid);
    if !admitted {
        if let Some(initiator) = acceptor.peer() {
            reset_remote(&initiator, sid);
        }
    }
}

/// 前提：调用方持有 `conn` 锁。
///
/// 按信用冲刷一条流的待流出队列：获准的片段排入对端队列；本端因半关闭
/// 补全而终结时，同时排入本端的零操作终结投递。只入队，不排水。
fn stage_outbound(
    inner: &Arc<Inner>,
    peer: Option<&Arc<Inner>>,
    conn: &mut ConnState,
    sid: StreamId,
) {
    let Some(record) = conn.streams.get_mut(&sid) else {
        return;
    };
    let (segments, fin) = record.flush_parked();
    let local_terminal = if record.state.is_closed() && !record.closed_delivered {
        record.closed_delivered = true;
        true
    } else {
        false
    };
    if !segments.is_empty() || fin {
        if let Some(peer) = peer {
            let receiver = Arc::clone(peer);
            peer.queue
                .enqueue(Box::new(move || deliver_inbound(receiver, sid, segments, fin)));
        }
    }
    if local_terminal {
        enqueue_local_terminal(inner, sid);
    }
}

/// 入站投递的实际执行体，运行在接收端的派发队列上。
///
/// 先在连接锁内折叠状态与窗口记账，再在锁外完成接收缓冲中转与
/// `recv_batch` 上行，最后按门控结果向发送端回授信用。
fn deliver_inbound(inner: Arc<Inner>, sid: StreamId, segments: Vec<Segment>, fin: bool) {
    let consumed: usize = segments.iter().map(Segment::window_cost).sum();
    let (stream, final_state, grant) = {
        let mut conn = inner.conn.lock();
        let Some(record) = conn.streams.get_mut(&sid) else {
            return;
        };
        if record.closed_delivered {
            return;
        }
        if fin {
            record.state = record.state.close_recv();
        }
        let final_state = record.state;
        if final_state.is_closed() {
            record.closed_delivered = true;
        }
        let grant = if record.allow_window_updates {
            consumed
        } else {
            record.withheld += consumed;
            0
        };
        (Stream::new(inner.id, sid), final_state, grant)
    };
    let Some(cb) = inner.callbacks() else {
        return;
    };
    let mut ops = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Data(payload) => stage_recv_data(&cb, &stream, payload, &mut ops),
            Segment::Metadata(item) => ops.push(StreamOp::Metadata(item)),
        }
    }
    {
        let _guard = DeliveryGuard::enter(&inner);
        cb.recv_batch(&stream, ops, final_state);
    }
    if grant > 0 {
        if let Some(sender) = inner.peer() {
            grant_credit(&sender, sid, grant);
        }
    }
}

/// 把入站数据经上层分配的接收缓冲中转为交付用的数据操作。
///
/// 缓冲可小于提示长度：按块切分，每块一个数据操作，次序不变。
fn stage_recv_data(
    cb: &Arc<dyn TransportCallbacks>,
    stream: &Stream,
    payload: Bytes,
    ops: &mut Vec<StreamOp>,
) {
    if payload.is_empty() {
        ops.push(StreamOp::Data(payload));
        return;
    }
    let mut remaining = payload;
    while !remaining.is_empty() {
        let mut buffer = cb.alloc_recv_buffer(Some(stream), remaining.len());
        let usable = if buffer.is_empty() {
            buffer.capacity().max(1)
        } else {
            buffer.len()
        };
        let take = usable.min(remaining.len());
        let chunk = remaining.split_to(take);
        buffer.clear();
        buffer.extend_from_slice(&chunk);
        ops.push(StreamOp::Data(buffer.freeze()));
    }
}

/// 排入一条零操作、`Closed` 终态的本端终结投递。只入队，不排水。
///
/// 前提：调用方已经在连接锁内把该流标记为 `closed_delivered`。
fn enqueue_local_terminal(inner: &Arc<Inner>, sid: StreamId) {
    let end = Arc::clone(inner);
    inner.queue.enqueue(Box::new(move || {
        let Some(cb) = end.callbacks() else {
            return;
        };
        let stream = Stream::new(end.id, sid);
        let _guard = DeliveryGuard::enter(&end);
        cb.recv_batch(&stream, Vec::new(), StreamState::Closed);
    }));
}

/// 向发送端回授窗口信用，并冲刷因信用不足而滞留的出站操作。
fn grant_credit(sender: &Arc<Inner>, sid: StreamId, amount: usize) {
    let peer = sender.peer();
    {
        let mut conn = sender.conn.lock();
        if let Some(record) = conn.streams.get_mut(&sid) {
            record.send_credit += amount;
        }
        stage_outbound(sender, peer.as_ref(), &mut conn, sid);
    }
    sender.queue.drain();
    if let Some(peer) = peer {
        peer.queue.drain();
    }
}

/// 把某一端的一条流标记为终结并兑现其终结投递（对端复位路径）。
fn reset_remote(end: &Arc<Inner>, sid: StreamId) {
    {
        let mut conn = end.conn.lock();
        if let Some(record) = conn.streams.get_mut(&sid) {
            if !record.closed_delivered {
                record.state = StreamState::Closed;
                record.closed_delivered = true;
                record.sent_last = true;
                record.parked.clear();
                enqueue_local_terminal(end, sid);
            }
        }
    }
    end.queue.drain();
}

/// 关闭一个端点：逐流兑现终结投递，最后触发一次 `closed` 上行。幂等。
fn shutdown_end(end: &Arc<Inner>) {
    {
        let mut conn = end.conn.lock();
        conn.phase = Phase::Closed;
        let terminal: Vec<StreamId> = conn
            .streams
            .iter_mut()
            .filter_map(|(sid, record)| {
                if record.closed_delivered {
                    None
                } else {
                    record.state = StreamState::Closed;
                    record.closed_delivered = true;
                    record.sent_last = true;
                    record.parked.clear();
                    Some(*sid)
                }
            })
            .collect();
        for sid in terminal {
            enqueue_local_terminal(end, sid);
        }
        if !conn.closed_upcall_sent {
            conn.closed_upcall_sent = true;
            let closing = Arc::clone(end);
            end.queue.enqueue(Box::new(move || {
                if let Some(cb) = closing.callbacks() {
                    cb.closed(closing.id);
                }
            }));
        }
    }
    // 未响应的探测随关闭丢弃：完成回调允许零次触发。
    drop(end.pings.drain());
    end.queue.drain();
}
