//! 批量视频生成流水线
//!
//! 把一批源视频（或剧本）自动加工成成品短视频：用浏览器驱动 Gemini 聊天
//! 完成分析与脚本加工，再驱动 Flow（VEO）生成每个场景的视频。所有远程
//! 能力都只有网页界面，没有官方接口。
//!
//! ## 架构分层
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ orchestrator  批量调度（并发、统计、退出码）   │
//! ├─────────────────────────────────────┤
//! │ workflow      单项目阶段流水线（恢复、回退）   │
//! ├─────────────────────────────────────┤
//! │ adapters      远程界面能力（Gemini/Flow/API）│
//! ├─────────────────────────────────────┤
//! │ browser/store 会话池、凭据快照、项目文档      │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## 核心约定
//!
//! - 项目文档里的 `stage` 是"下一个要运行的阶段"，只前进不后退
//! - 每个阶段完成即落盘，崩溃后从断点恢复，已完成的阶段零次界面调用
//! - 每个条目独占一个浏览器会话，互不共享凭据与 user-data-dir
//! - 所有外部操作被有界重试包裹，失败语义统一为结构化错误

pub mod adapters;
pub mod browser;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod store;
pub mod utils;
pub mod workflow;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{BatchConfig, GenStatus, Project, Stage};
pub use orchestrator::{App, BatchSummary};
pub use workflow::Workflow;
