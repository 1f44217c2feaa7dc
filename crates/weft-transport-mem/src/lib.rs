#![doc = r#"
# weft-transport-mem

## 设计动机（Why）
- **定位**：该 crate 提供传输契约在进程内的最小完整实现：一次建立产出
  一对互联的内存传输端点，流、批次、窗口、受理、Ping、goaway 与关闭
  全部走真实的契约路径，只是"线缆"换成了进程内队列。
- **架构角色**：作为传输实现层的语义参照与测试基底——上层调用面、
  契约测试套件（TCK）以及未来的成帧协议实现都以它为行为基准。
- **设计理念**：强调"次序契约"与"终结保证"：所有上行回调经由每端一条的
  派发队列串行执行，`Closed` 终结投递对每条流恰好兑现一次，
  无论终止自何种路径（自然关闭、中止、连接关闭）。

## 核心契约（What）
- **输入条件**：上层按契约使用——同一条流的出站批次自行串行、
  观察到 `Closed` 之后才销毁流；
- **输出保障**：单流投递按到达序呈现且 `Closed` 殿后；流量门关闭期间
  既有窗口允许的数据照常投递，重新开门后积压窗口一次性补发；
- **前置约束**：契约违例（提前销毁、投递栈内销毁、半关闭后继续提交）
  以断言失败暴露，不作为可恢复错误返回。

## 实现策略（How）
- **端点结构**：每端持有流记录表（竞技场，按流标识索引）、派发队列与
  Ping 台账；对端以弱引用互联，避免成对端点的引用环；
- **流量控制**：信用计数制——发送端消耗信用，接收端投递后按门控状态
  决定立即回授还是暂扣；
- **数据通路**：入站数据经 `alloc_recv_buffer` 分配的接收缓冲中转，
  缓冲小于提示长度时按块切分为多个数据操作，对齐线缆实现的读路径。

## 风险与考量（Trade-offs）
- **执行线程**：上行回调在最后触发动作的调用方线程上排水执行，
  回调的执行成本由该线程承担；
- **中转拷贝**：数据经接收缓冲中转引入一次拷贝，换取受方控制的
  缓冲分配语义；对零拷贝敏感的场景应使用真实线缆实现。
"#]
#![deny(unsafe_code)]

mod fabric;
mod setup;
mod stream;
mod transport;

pub use fabric::{MemFabricBuilder, MemPair};
pub use setup::MemSetup;
pub use transport::MemTransport;
