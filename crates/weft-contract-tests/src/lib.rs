//! weft 传输契约测试套件（TCK）入口。
//!
//! # 教案式综述（Why / How / What）
//! - **为什么存在**：传输契约的约束大半落在运行期行为上（终结恰好一次、
//!   次序、取消静默），类型系统查不出来；把断言集中成独立 crate，
//!   任何传输实现接上一个工厂即可整套回归。
//! - **如何集成**：在被测 crate 的 `tests` 目录实现 [`TransportFactory`]，
//!   调用 [`run_all`] 或按主题调用 `run_*` 入口函数。
//! - **测试对象**：以 `weft-transport` 暴露的契约面为边界——流生命周期、
//!   流量控制、连接级控制面与连接建立四大主题。
//!
//! # 契约说明（What）
//! - **输入要求**：工厂的 `establish` 必须返回已互联、已挂接
//!   [`RecordingCallbacks`](support::RecordingCallbacks) 的端点对；
//! - **输出保证**：全部用例通过即可确信实现满足契约对终结投递、窗口
//!   回授、goaway 语义与建立取消的显式约束。
//!
//! # 风险提示（Trade-offs）
//! - 用例以条件等待容忍异步实现，超时固定为 5 秒；极慢的实现（如注入
//!   大延迟的模拟线缆）需要自行放宽或跳过相关用例。

mod control;
mod establishment;
mod factory;
mod flow;
mod lifecycle;
pub mod support;

pub use case::{TckCase, TckSuite};
pub use factory::{TransportFactory, TransportPair};

use case::run_suite;

const ALL_SUITES: [&TckSuite; 4] = [
    lifecycle::suite(),
    flow::suite(),
    control::suite(),
    establishment::suite(),
];

mod case {
    use std::panic;

    use crate::factory::TransportFactory;
    use crate::support;

    /// 单个 TCK 用例的元信息。
    ///
    /// `test` 以工厂为唯一入口，失败时必须 panic；名称用于失败上下文。
    #[derive(Clone, Copy)]
    pub struct TckCase {
        /// 用例的人类可读名称。
        pub name: &'static str,
        /// 实际执行的断言逻辑。
        pub test: fn(&dyn TransportFactory),
    }

    /// 同一主题的一组 TCK 用例。
    #[derive(Clone, Copy)]
    pub struct TckSuite {
        /// 套件名称，供日志与失败上下文使用。
        pub name: &'static str,
        /// 归属该套件的用例集合。
        pub cases: &'static [TckCase],
    }

    /// 在捕获 panic 的前提下执行整个套件，失败时附加“套件/用例”上下文重抛。
    pub fn run_suite(suite: &TckSuite, factory: &dyn TransportFactory) {
        assert!(!suite.cases.is_empty(), "TCK 套件不应为空");
        for case in suite.cases {
            let outcome =
                panic::catch_unwind(panic::AssertUnwindSafe(|| (case.test)(factory)));
            if let Err(payload) = outcome {
                support::panic_with_context(suite.name, case.name, payload);
            }
        }
    }
}

/// 返回所有已注册的 TCK 套件，按默认执行顺序排列。
pub fn all_suites() -> &'static [&'static TckSuite] {
    &ALL_SUITES
}

/// 对给定工厂执行全部套件。
pub fn run_all(factory: &dyn TransportFactory) {
    for suite in ALL_SUITES {
        run_suite(suite, factory);
    }
}

/// 运行“流生命周期”主题：开启、受理、终结投递与销毁纪律。
pub fn run_lifecycle_suite(factory: &dyn TransportFactory) {
    run_suite(lifecycle::suite(), factory);
}

/// 运行“流量控制”主题：窗口、信用回授门控与接收缓冲分块。
pub fn run_flow_suite(factory: &dyn TransportFactory) {
    run_suite(flow::suite(), factory);
}

/// 运行“连接级控制面”主题：Ping、goaway、轮询集与能力汇报。
pub fn run_control_suite(factory: &dyn TransportFactory) {
    run_suite(control::suite(), factory);
}

/// 运行“连接建立”主题：完成通路与取消保证。
pub fn run_establishment_suite(factory: &dyn TransportFactory) {
    run_suite(establishment::suite(), factory);
}
