//! 批量运行器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量条目的调度和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动日志、建立项目存储与会话池
//! 2. **批量加载**：解析批处理配置，合并默认项（由 models::batch 完成）
//! 3. **并发控制**：使用 Semaphore 限制同时运行的工作流数量
//! 4. **会话隔离**：每个条目独占 `batch_{i}` 会话（独立浏览器与凭据）
//! 5. **断点恢复**：同名项目已存在时从其 stage 继续，不重新创建
//! 6. **全局统计**：汇总所有条目的处理结果，决定退出码
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个项目的阶段细节，向下委托给 Workflow
//! - **资源所有者**：唯一持有 SessionPool 的模块
//! - **并发安全**：通过 Semaphore 和 tokio::spawn 实现并发

use crate::adapters::{ApiTextAdapter, CapabilityAdapter, FlowVideoAdapter, GeminiChatAdapter};
use crate::browser::SessionPool;
use crate::config::Config;
use crate::error::{AppError, StoreError};
use crate::models::{BatchConfig, ItemConfig, Project, Stage};
use crate::store::{ProjectStore, ResponseSnapshots};
use crate::utils::download::download_source;
use crate::utils::logging;
use crate::workflow::{EventPublisher, Workflow, WorkflowEvent};
use anyhow::Result;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    batch: BatchConfig,
    store: Arc<ProjectStore>,
    snapshots: Arc<ResponseSnapshots>,
    pool: Arc<SessionPool>,
    dry_run: bool,
    /// 测试注入点：给定时替代真实界面适配器
    adapters: Option<(Arc<dyn CapabilityAdapter>, Arc<dyn CapabilityAdapter>)>,
}

/// 批量运行汇总
#[derive(Debug, Default, Clone)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// 退出码判定：全部条目完全成功才算成功
    pub fn all_successful(&self) -> bool {
        self.successful == self.total
    }
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config, batch: BatchConfig, dry_run: bool) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;

        let store = Arc::new(ProjectStore::new(&config.projects_dir)?);
        let snapshots = Arc::new(ResponseSnapshots::new(&config.outputs_dir));
        let pool = Arc::new(SessionPool::new(config.session.clone()));

        Ok(Self {
            config,
            batch,
            store,
            snapshots,
            pool,
            dry_run,
            adapters: None,
        })
    }

    /// 测试注入：替换文本与视频适配器
    pub fn with_adapters(
        mut self,
        text: Arc<dyn CapabilityAdapter>,
        video: Arc<dyn CapabilityAdapter>,
    ) -> Self {
        self.adapters = Some((text, video));
        self
    }

    /// 运行批处理主逻辑
    pub async fn run(&self) -> Result<BatchSummary> {
        let total = self.batch.items.len();
        if total == 0 {
            warn!("⚠️ 批处理配置中没有任何条目，程序结束");
            return Ok(BatchSummary::default());
        }

        logging::log_startup(total, self.batch.max_concurrent);

        if self.dry_run {
            self.print_dry_run();
            return Ok(BatchSummary {
                total,
                successful: total,
                ..Default::default()
            });
        }

        let summary = self.process_all_items().await?;
        logging::print_final_stats(summary.successful, summary.failed, summary.total);
        if summary.partial > 0 {
            info!("⚠️ 部分成功: {} 个（产出不完整，已保留最好结果）", summary.partial);
        }

        self.pool.shutdown().await;
        Ok(summary)
    }

    /// 只打印解析后的执行计划，不碰任何会话
    fn print_dry_run(&self) {
        info!("🔎 演练模式：以下条目将被处理");
        for (i, item) in self.batch.items.iter().enumerate() {
            let source = item
                .path
                .as_deref()
                .or(item.url.as_deref())
                .unwrap_or(if item.script.is_empty() { "<缺少来源>" } else { "<剧本>" });
            info!(
                "  [{}] {} | 来源: {} | 风格: {} | 时长: {}s | 画幅: {} | 档位: {} × {}",
                i + 1,
                item.name,
                source,
                item.style,
                item.duration,
                item.aspect_ratio,
                item.veo_profile,
                item.outputs_per_prompt,
            );
        }
    }

    /// 并发处理所有条目
    async fn process_all_items(&self) -> Result<BatchSummary> {
        let semaphore = Arc::new(Semaphore::new(self.batch.max_concurrent));
        let total = self.batch.items.len();
        let mut handles = Vec::with_capacity(total);

        for (index, item) in self.batch.items.iter().cloned().enumerate() {
            let permit = semaphore.clone().acquire_owned().await?;

            let config = self.config.clone();
            let store = self.store.clone();
            let snapshots = self.snapshots.clone();
            let pool = self.pool.clone();
            let adapters = self.adapters.clone();
            let item_name = item.name.clone();
            let task_name = item_name.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                logging::log_item_start(index + 1, total, &task_name);
                process_item(config, store, snapshots, pool, adapters, item, index).await
            });
            handles.push((item_name, handle));
        }

        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(project)) => match project.status.as_str() {
                    "successful" => summary.successful += 1,
                    "partial" => summary.partial += 1,
                    _ => {
                        warn!("[{}] 条目未完成 (status: {})", name, project.status);
                        summary.failed += 1;
                    }
                },
                Ok(Err(e)) => {
                    error!("[{}] ❌ 处理过程中发生错误: {}", name, e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("[{}] 任务执行失败: {}", name, e);
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// 处理单个条目：准备项目文档与源视频，然后运行工作流
async fn process_item(
    config: Config,
    store: Arc<ProjectStore>,
    snapshots: Arc<ResponseSnapshots>,
    pool: Arc<SessionPool>,
    adapters: Option<(Arc<dyn CapabilityAdapter>, Arc<dyn CapabilityAdapter>)>,
    item: ItemConfig,
    index: usize,
) -> Result<Project> {
    let id = Project::id_for_name(&item.name);

    // 同名项目已存在则从其进度恢复；文档损坏必须报错，不能覆盖重建
    let project = match store.load(&id) {
        Ok(existing) => {
            info!(
                "[{}] 📂 发现已有项目 (stage: {})，从进度恢复",
                id,
                existing.stage.name()
            );
            existing
        }
        Err(AppError::Store(StoreError::NotFound { .. })) => store.create(&item)?,
        Err(e) => return Err(e.into()),
    };

    // 只给了 URL 时先把源视频落地（有剧本则不需要源视频）
    if project.stage < Stage::Complete && project.script.trim().is_empty() {
        let have_local = project
            .video_path
            .as_deref()
            .map(|p| Path::new(p).exists())
            .unwrap_or(false);
        if !have_local {
            if let Some(url) = &project.video_url {
                let path = download_source(&config.videos_dir, url).await?;
                let path_str = path.display().to_string();
                store.update(&id, json!({"video_path": path_str}))?;
            }
        }
    }

    let session_id = format!("batch_{}", index);
    let session = pool.acquire(&session_id).await;

    let (text_adapter, video_adapter) = match adapters {
        Some(pair) => pair,
        None => build_adapters(&config),
    };

    // 工作流事件在批处理层落日志
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let log_id = id.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                WorkflowEvent::StageStarted { stage, .. } => {
                    info!("[{}] ▶️ 阶段开始: {}", log_id, stage.name())
                }
                WorkflowEvent::StageCompleted { stage, .. } => {
                    info!("[{}] ✓ 阶段完成: {}", log_id, stage.name())
                }
                WorkflowEvent::StageFailed { stage, error, .. } => {
                    warn!("[{}] ❌ 阶段失败: {} ({})", log_id, stage.name(), error)
                }
                WorkflowEvent::VideoSettled {
                    scene_id, status, ..
                } => info!("[{}] 🎬 视频落定: {} ({:?})", log_id, scene_id, status),
                WorkflowEvent::WorkflowCompleted { .. } => {
                    info!("[{}] 🏁 工作流完成", log_id)
                }
            }
        }
    });

    let workflow = Workflow::new(
        config,
        store,
        snapshots,
        text_adapter,
        video_adapter,
        session,
    )
    .with_events(EventPublisher::new(tx));
    let result = workflow.run(&id).await;

    // 工作流析构后事件通道关闭，日志任务随之退出
    drop(workflow);
    let _ = event_task.await;

    pool.release(&session_id, true).await;
    Ok(result?)
}

/// 按配置挑选真实适配器：文本走浏览器或 API，视频始终走 Flow
fn build_adapters(config: &Config) -> (Arc<dyn CapabilityAdapter>, Arc<dyn CapabilityAdapter>) {
    let text: Arc<dyn CapabilityAdapter> = if config.use_browser_for_text {
        Arc::new(GeminiChatAdapter::new(
            &config.gemini_url,
            &config.gemini_email,
            &config.gemini_password,
        ))
    } else {
        Arc::new(ApiTextAdapter::new(config))
    };
    let video: Arc<dyn CapabilityAdapter> = Arc::new(FlowVideoAdapter::new(&config.flow_url));
    (text, video)
}
