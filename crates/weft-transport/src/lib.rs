#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![doc = "weft-transport: 多路复用流式传输层的统一契约抽象。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：RPC 运行时的下层需要一个与具体线缆协议解耦的抽象——一条连接承载多条逻辑流，"]
#![doc = "  每条流对应一次调用。具体成帧协议（HTTP/2、QUIC、进程内管道等）只需实现本 crate 的契约，"]
#![doc = "  上层调用面则永远只面对这一套接口。"]
#![doc = "- **What**：定义 [`Transport`]、[`TransportCallbacks`]、[`TransportSetup`] 三张核心接口表，"]
#![doc = "  以及流状态机（[`StreamState`]）、批量操作模型（[`StreamOp`]）、流量控制门、"]
#![doc = "  Ping 台账与上行回调派发队列等配套构件。"]
#![doc = "- **How**：面向 `no_std + alloc` 环境设计；缓冲一律使用 `bytes::Bytes` 的移动语义完成"]
#![doc = "  所有权移交；重入禁区通过 [`UpcallQueue`] 的单排水线程纪律在结构上消除，而非靠文档约定。"]

extern crate alloc;

pub mod callbacks;
pub mod error;
pub mod handle;
pub mod op;
pub mod ping;
pub mod setup;
pub mod state;
pub mod status;
pub mod transport;
pub mod upcall;

pub use callbacks::TransportCallbacks;
pub use error::AdmitError;
pub use handle::{AcceptToken, Stream, StreamId, TransportId};
pub use op::{MetadataItem, StreamOp};
pub use ping::{PingId, PingLedger};
pub use setup::{SetupCompletion, TransportSetup};
pub use state::StreamState;
pub use status::StatusCode;
pub use transport::{PingCompletion, Pollset, Transport};
pub use upcall::UpcallQueue;
