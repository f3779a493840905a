//! 주문 실행의 핵심 구현체

pub mod engine;
pub mod plan_executor;
pub mod reconciliation;
pub mod tca;

pub use engine::ExecutionEngine;
pub use plan_executor::PlanExecutor;
pub use reconciliation::{Reconciler, ReconciliationSummary};
pub use tca::{BenchmarkPrices, TcaReport, TcaReporter, TcaStore};
