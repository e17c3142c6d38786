//! 工作流编排 - 流程编排层
//!
//! 驱动单个项目沿阶段流水线前进：
//! analyze → content → characters → scenes → prompts → videos → complete
//!
//! 核心约定：
//! - 持久化的 stage 是"下一个要运行的阶段"，每个阶段完成后立刻落盘，
//!   崩溃后从 stage 恢复，已完成的阶段零次界面调用
//! - stage 只前进不后退；上游输入缺失（半截文档）时在内存里回退执行，
//!   落盘值取 max 保持单调
//! - 每个阶段被有界重试包裹；文本阶段重试间软重置会话
//! - videos 阶段逐条落盘，恢复时只重跑 FAILED 的条目

use crate::adapters::{CapabilityAdapter, SubmitOptions, SubmitOutput, SubmitRequest};
use crate::browser::{domain_of, Session};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{GenStatus, Project, Stage, VideoResult, VideoStyle};
use crate::retry::{run_with_retry, ResetKind};
use crate::store::{ProjectStore, ResponseSnapshots};
use crate::utils::text::{extract_json, extract_numbered_list};
use crate::workflow::events::{EventPublisher, WorkflowEvent};
use crate::workflow::prompts;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// 单项目工作流
///
/// 一个工作流独占一个会话；并发由批处理层用多个工作流实现。
pub struct Workflow {
    config: Config,
    store: Arc<ProjectStore>,
    snapshots: Arc<ResponseSnapshots>,
    text_adapter: Arc<dyn CapabilityAdapter>,
    video_adapter: Arc<dyn CapabilityAdapter>,
    session: Session,
    events: EventPublisher,
    stop_flag: Arc<AtomicBool>,
}

impl Workflow {
    pub fn new(
        config: Config,
        store: Arc<ProjectStore>,
        snapshots: Arc<ResponseSnapshots>,
        text_adapter: Arc<dyn CapabilityAdapter>,
        video_adapter: Arc<dyn CapabilityAdapter>,
        session: Session,
    ) -> Self {
        Self {
            config,
            store,
            snapshots,
            text_adapter,
            video_adapter,
            session,
            events: EventPublisher::disabled(),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    /// 协作式停止句柄：置位后在下一个阶段边界停下
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    /// 运行（或恢复）一个项目直到 complete
    ///
    /// 返回最终的项目文档；阶段重试耗尽时返回错误，已落盘的进度保留。
    pub async fn run(&self, project_id: &str) -> AppResult<Project> {
        let mut project = self.store.load(project_id)?;
        let id = project.id();

        if project.stage == Stage::Complete {
            if !project.has_failed_videos() {
                info!("[{}] ✓ 项目已完成，无需处理", id);
                return Ok(project);
            }
            // 终态但有失败的视频：只重跑失败条目
            info!("[{}] 🔁 项目已完成但存在失败视频，仅重试失败条目", id);
            self.store.update(&id, json!({"status": "processing"}))?;
            self.run_videos(&mut project).await?;
            self.finalize(&mut project)?;
            return Ok(project);
        }

        self.store.update(&id, json!({"status": "processing"}))?;
        project.status = "processing".to_string();

        while project.stage != Stage::Complete {
            if self.stop_flag.load(Ordering::SeqCst) {
                warn!("[{}] ⏸️ 收到停止请求，在阶段边界停下 (stage: {})", id, project.stage.name());
                return Ok(project);
            }

            let stage = self.effective_stage(&project);
            self.events.emit(WorkflowEvent::StageStarted {
                project_id: id.clone(),
                stage,
            });

            let result = match stage {
                Stage::Start => Ok(()),
                Stage::Analyze => self.run_analyze(&mut project).await,
                Stage::Content => self.run_content(&mut project).await,
                Stage::Characters => self.run_characters(&mut project).await,
                Stage::Scenes => self.run_scenes(&mut project).await,
                Stage::Prompts => self.run_prompts(&mut project).await,
                Stage::Videos => self.run_videos(&mut project).await,
                Stage::Complete => Ok(()),
            };

            match result {
                Ok(()) => {
                    // 回退执行后落盘值取 max，stage 保持单调
                    project.stage = std::cmp::max(project.stage, stage.next());
                    self.store
                        .update(&id, json!({"stage": project.stage}))?;
                    self.events.emit(WorkflowEvent::StageCompleted {
                        project_id: id.clone(),
                        stage,
                    });
                }
                Err(e) => {
                    self.events.emit(WorkflowEvent::StageFailed {
                        project_id: id.clone(),
                        stage,
                        error: e.to_string(),
                    });
                    if let Err(w) = self.store.update(&id, json!({"status": "failed"})) {
                        warn!("[{}] ⚠️ 写入失败状态失败: {}", id, w);
                    }
                    return Err(e);
                }
            }
        }

        self.finalize(&mut project)?;
        self.events.emit(WorkflowEvent::WorkflowCompleted {
            project_id: id,
        });
        Ok(project)
    }

    /// 按视频结果汇总最终状态并落盘
    fn finalize(&self, project: &mut Project) -> AppResult<()> {
        let (ok, partial, failed) = project.video_counts();
        project.status = if failed > 0 {
            "failed".to_string()
        } else if partial > 0 {
            "partial".to_string()
        } else {
            "successful".to_string()
        };
        let id = project.id();
        self.store
            .update(&id, json!({"status": project.status}))?;
        info!(
            "[{}] 🏁 完成: 成功 {} / 部分 {} / 失败 {}",
            id, ok, partial, failed
        );
        Ok(())
    }

    /// 确定本轮实际要执行的阶段
    ///
    /// 半截文档（stage 已推进但上游输出缺失）在内存里回退到能补齐输入的
    /// 最早阶段执行，持久化的 stage 不回退。
    fn effective_stage(&self, project: &Project) -> Stage {
        let mut stage = project.stage;
        loop {
            let missing_input = match stage {
                Stage::Content => {
                    project.analysis.is_none() && project.script.trim().is_empty()
                }
                Stage::Characters => project.content.is_none(),
                Stage::Scenes => project.content.is_none() || project.characters.is_none(),
                Stage::Prompts => project.scenes.is_none(),
                Stage::Videos => project.prompts.is_none(),
                _ => false,
            };
            if !missing_input || stage == Stage::Start {
                return stage;
            }
            let prev = Stage::ORDER[stage.index() - 1];
            warn!(
                "[{}] ⚠️ 阶段 {} 的上游输入缺失，回退执行 {}",
                project.id(),
                stage.name(),
                prev.name()
            );
            stage = prev;
        }
    }

    fn style(&self, project: &Project) -> Option<VideoStyle> {
        VideoStyle::from_label(&project.style)
    }

    /// 文本阶段的统一提交路径：有界重试 + 软重置
    async fn submit_text(
        &self,
        stage: &str,
        request: SubmitRequest,
    ) -> AppResult<(String, Option<String>)> {
        let adapter = self.text_adapter.clone();
        let session = self.session.clone();
        let output = run_with_retry(
            stage,
            &self.config.retry,
            Some(&self.session),
            ResetKind::Soft,
            move || {
                let adapter = adapter.clone();
                let session = session.clone();
                let request = request.clone();
                async move { adapter.submit(&session, request).await }
            },
        )
        .await?;

        match output {
            SubmitOutput::Text {
                text,
                conversation_url,
            } => Ok((text, conversation_url)),
            SubmitOutput::Media { .. } => Err(AppError::Other(
                "文本阶段收到媒体输出".to_string(),
            )),
        }
    }

    // ========== 各阶段 ==========

    async fn run_analyze(&self, project: &mut Project) -> AppResult<()> {
        let id = project.id();

        // 给定剧本时直接短路，零次界面调用
        if !project.script.trim().is_empty() {
            info!("[{}] 📜 已提供剧本，跳过视频分析", id);
            project.analysis = Some(project.script.clone());
            self.store
                .update(&id, json!({"analysis": project.analysis}))?;
            return Ok(());
        }

        let path = project
            .video_path
            .clone()
            .ok_or_else(|| AppError::missing_input("analyze", "video_path"))?;

        let request = SubmitRequest::text(prompts::analyze_prompt())
            .with_attachment(path)
            .with_conversation(project.gemini_conversation_url.clone());
        let (text, conv) = self.submit_text("analyze", request).await?;

        self.snapshots.save(&id, "analyze", &text)?;
        project.analysis = Some(text);
        if conv.is_some() {
            project.gemini_conversation_url = conv;
        }
        self.store.update(
            &id,
            json!({
                "analysis": project.analysis,
                "gemini_conversation_url": project.gemini_conversation_url,
            }),
        )?;
        Ok(())
    }

    async fn run_content(&self, project: &mut Project) -> AppResult<()> {
        let id = project.id();
        let analysis = match &project.analysis {
            Some(a) => a.clone(),
            None if !project.script.trim().is_empty() => project.script.clone(),
            None => return Err(AppError::missing_input("content", "analysis")),
        };

        let prompt = prompts::content_prompt(&analysis, self.style(project), project.duration);
        let request = SubmitRequest::text(prompt)
            .with_conversation(project.gemini_conversation_url.clone());
        let (text, conv) = self.submit_text("content", request).await?;

        self.snapshots.save(&id, "content", &text)?;
        project.content = Some(text);
        if conv.is_some() {
            project.gemini_conversation_url = conv;
        }
        self.store.update(
            &id,
            json!({
                "content": project.content,
                "gemini_conversation_url": project.gemini_conversation_url,
            }),
        )?;
        Ok(())
    }

    async fn run_characters(&self, project: &mut Project) -> AppResult<()> {
        let id = project.id();
        let content = project
            .content
            .clone()
            .ok_or_else(|| AppError::missing_input("characters", "content"))?;

        let request = SubmitRequest::text(prompts::characters_prompt(&content))
            .with_conversation(project.gemini_conversation_url.clone());
        let (text, conv) = self.submit_text("characters", request).await?;

        self.snapshots.save(&id, "characters", &text)?;
        let characters = extract_json("characters", &text)?;
        project.characters = Some(characters);
        if conv.is_some() {
            project.gemini_conversation_url = conv;
        }
        self.store.update(
            &id,
            json!({
                "characters": project.characters,
                "gemini_conversation_url": project.gemini_conversation_url,
            }),
        )?;
        Ok(())
    }

    async fn run_scenes(&self, project: &mut Project) -> AppResult<()> {
        let id = project.id();
        let content = project
            .content
            .clone()
            .ok_or_else(|| AppError::missing_input("scenes", "content"))?;
        let characters_json = project
            .characters
            .as_ref()
            .map(|c| serde_json::to_string_pretty(c))
            .transpose()?
            .unwrap_or_else(|| "{}".to_string());

        let request = SubmitRequest::text(prompts::scenes_prompt(&content, &characters_json))
            .with_conversation(project.gemini_conversation_url.clone());
        let (text, conv) = self.submit_text("scenes", request).await?;

        self.snapshots.save(&id, "scenes", &text)?;
        let value = extract_json("scenes", &text)?;
        let scenes: Vec<serde_json::Value> = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map.remove("scenes") {
                Some(serde_json::Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        if scenes.is_empty() {
            return Err(AppError::Stage(crate::error::StageError::OutputParseFailed {
                stage: "scenes".to_string(),
                detail: "场景列表为空".to_string(),
            }));
        }
        info!("[{}] 🎞️ 解析出 {} 个场景", id, scenes.len());

        project.scenes = Some(scenes);
        if conv.is_some() {
            project.gemini_conversation_url = conv;
        }
        self.store.update(
            &id,
            json!({
                "scenes": project.scenes,
                "gemini_conversation_url": project.gemini_conversation_url,
            }),
        )?;
        Ok(())
    }

    async fn run_prompts(&self, project: &mut Project) -> AppResult<()> {
        let id = project.id();
        let scenes = project
            .scenes
            .clone()
            .ok_or_else(|| AppError::missing_input("prompts", "scenes"))?;
        let scenes_json = serde_json::to_string_pretty(&scenes)?;

        let request = SubmitRequest::text(prompts::video_prompts_prompt(
            &scenes_json,
            self.style(project),
        ))
        .with_conversation(project.gemini_conversation_url.clone());
        let (text, conv) = self.submit_text("prompts", request).await?;

        self.snapshots.save(&id, "prompts", &text)?;
        let items = extract_numbered_list("prompts", &text)?;
        if items.len() != scenes.len() {
            warn!(
                "[{}] ⚠️ 提示词数量 ({}) 与场景数量 ({}) 不一致",
                id,
                items.len(),
                scenes.len()
            );
        }

        project.prompts = Some(items);
        if conv.is_some() {
            project.gemini_conversation_url = conv;
        }
        self.store.update(
            &id,
            json!({
                "prompts": project.prompts,
                "gemini_conversation_url": project.gemini_conversation_url,
            }),
        )?;
        Ok(())
    }

    /// videos 阶段：逐条生成、逐条落盘，恢复时跳过已成功/已部分的条目
    async fn run_videos(&self, project: &mut Project) -> AppResult<()> {
        let id = project.id();
        let prompt_list = project
            .prompts
            .clone()
            .ok_or_else(|| AppError::missing_input("videos", "prompts"))?;

        // 对齐结果表：每条提示词一个槽位，保留已有记录，随即落盘
        if project.videos.len() != prompt_list.len() {
            let mut videos = Vec::with_capacity(prompt_list.len());
            for (i, prompt) in prompt_list.iter().enumerate() {
                let scene_id = format!("scene_{}", i + 1);
                let existing = project
                    .videos
                    .iter()
                    .find(|v| v.scene_id == scene_id)
                    .cloned();
                videos.push(existing.unwrap_or(VideoResult {
                    scene_id,
                    prompt: prompt.clone(),
                    status: GenStatus::Pending,
                    video_url: None,
                    error: None,
                    duration_secs: None,
                    attempts: 0,
                }));
            }
            project.videos = videos;
            self.store
                .update(&id, json!({"videos": project.videos}))?;
        }

        let total = project.videos.len();
        for i in 0..total {
            let (scene_id, prompt, status) = {
                let v = &project.videos[i];
                (v.scene_id.clone(), v.prompt.clone(), v.status)
            };
            if matches!(status, GenStatus::Successful | GenStatus::Partial) {
                continue;
            }

            info!("[{}] 🎬 生成视频 [{}/{}]: {}", id, i + 1, total, scene_id);
            let settled = self.generate_one_video(project, i, &scene_id, &prompt).await;

            let entry = &mut project.videos[i];
            entry.status = settled.status;
            entry.video_url = settled.video_url;
            entry.error = settled.error;
            entry.duration_secs = settled.duration_secs;
            entry.attempts += settled.attempts;

            self.store
                .update(&id, json!({"videos": project.videos}))?;
            self.events.emit(WorkflowEvent::VideoSettled {
                project_id: id.clone(),
                scene_id,
                status: settled.status,
            });
        }
        Ok(())
    }

    /// 生成单条视频并做结构性后置条件检查
    ///
    /// 时长不足不算硬失败：先把已有产出临时落盘，再硬重置（清凭据）
    /// 有界重生成，仍不达标则以 PARTIAL 落定并保留最好的产出。
    async fn generate_one_video(
        &self,
        project: &mut Project,
        slot: usize,
        scene_id: &str,
        prompt: &str,
    ) -> SettledVideo {
        let options = SubmitOptions {
            conversation_url: None,
            aspect_ratio: non_empty(&project.aspect_ratio),
            outputs_per_prompt: (project.outputs_per_prompt > 0)
                .then_some(project.outputs_per_prompt),
            veo_profile: non_empty(&project.veo_profile),
        };
        let request = SubmitRequest {
            prompt: prompt.to_string(),
            attachments: Vec::new(),
            options,
        };

        let adapter = self.video_adapter.clone();
        let session = self.session.clone();
        let retry_request = request.clone();
        let outcome = run_with_retry(
            &format!("videos/{}", scene_id),
            &self.config.retry,
            Some(&self.session),
            ResetKind::Soft,
            move || {
                let adapter = adapter.clone();
                let session = session.clone();
                let request = retry_request.clone();
                async move { adapter.submit(&session, request).await }
            },
        )
        .await;

        let (mut url, mut duration) = match outcome {
            Ok(SubmitOutput::Media { url, duration_secs }) => (url, duration_secs),
            Ok(SubmitOutput::Text { .. }) => {
                return SettledVideo::failed("视频阶段收到文本输出", self.config.retry.max_attempts)
            }
            Err(e) => {
                return SettledVideo::failed(&e.to_string(), self.config.retry.max_attempts)
            }
        };
        let mut attempts = 1;

        if self.duration_ok(duration) {
            return SettledVideo::successful(url, duration, attempts);
        }

        // 结构性后置条件失败：会话可能已"中毒"，清凭据硬重置后重生成
        warn!(
            "[{}] ⚠️ 时长不达标 ({:?}s < {}s)，硬重置后重试",
            scene_id, duration, self.config.min_duration_secs
        );

        // 重生成前把短时长产出临时落盘：重试轮次里崩溃也不丢已有产出
        {
            let entry = &mut project.videos[slot];
            entry.video_url = url.clone();
            entry.duration_secs = duration;
            entry.error = Some(format!(
                "时长 {:?}s 低于下限 {}s，待重生成",
                duration, self.config.min_duration_secs
            ));
        }
        if let Err(e) = self
            .store
            .update(&project.id(), json!({"videos": project.videos}))
        {
            warn!("[{}] ⚠️ 临时落盘失败: {}", scene_id, e);
        }

        for round in 1..=self.config.video_postcondition_retries {
            if let Err(e) = self
                .session
                .hard_reset(&domain_of(&self.config.flow_url))
                .await
            {
                warn!("[{}] ⚠️ 硬重置失败: {}", scene_id, e);
            }
            match self.video_adapter.submit(&self.session, request.clone()).await {
                Ok(SubmitOutput::Media { url: u, duration_secs: d }) => {
                    attempts += 1;
                    if self.duration_ok(d) {
                        return SettledVideo::successful(u, d, attempts);
                    }
                    // 保留时长最长的产出
                    if d.unwrap_or(0.0) > duration.unwrap_or(0.0) {
                        url = u;
                        duration = d;
                    }
                }
                Ok(SubmitOutput::Text { .. }) => {
                    attempts += 1;
                }
                Err(e) => {
                    attempts += 1;
                    warn!(
                        "[{}] ⚠️ 后置条件重试第 {} 轮失败: {}",
                        scene_id, round, e
                    );
                }
            }
        }

        SettledVideo {
            status: GenStatus::Partial,
            video_url: url,
            error: Some(format!(
                "时长 {:?}s 低于下限 {}s",
                duration, self.config.min_duration_secs
            )),
            duration_secs: duration,
            attempts,
        }
    }

    fn duration_ok(&self, duration: Option<f64>) -> bool {
        if self.config.min_duration_secs <= 0.0 {
            return true;
        }
        duration.map_or(false, |d| d >= self.config.min_duration_secs)
    }
}

/// 单条视频的落定结果
struct SettledVideo {
    status: GenStatus,
    video_url: Option<String>,
    error: Option<String>,
    duration_secs: Option<f64>,
    attempts: usize,
}

impl SettledVideo {
    fn successful(url: Option<String>, duration: Option<f64>, attempts: usize) -> Self {
        Self {
            status: GenStatus::Successful,
            video_url: url,
            error: None,
            duration_secs: duration,
            attempts,
        }
    }

    fn failed(error: &str, attempts: usize) -> Self {
        Self {
            status: GenStatus::Failed,
            video_url: None,
            error: Some(error.to_string()),
            duration_secs: None,
            attempts,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::models::batch::ItemConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// 按脚本顺序吐响应的假适配器
    struct MockAdapter {
        name: &'static str,
        responses: StdMutex<VecDeque<Result<SubmitOutput, String>>>,
        calls: AtomicUsize,
    }

    impl MockAdapter {
        fn new(name: &'static str, responses: Vec<Result<SubmitOutput, String>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                responses: StdMutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CapabilityAdapter for MockAdapter {
        fn surface_name(&self) -> &str {
            self.name
        }

        async fn submit(
            &self,
            _session: &Session,
            _request: SubmitRequest,
        ) -> AppResult<SubmitOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(output)) => Ok(output),
                Some(Err(msg)) => Err(AppError::Other(msg)),
                None => Err(AppError::Other("脚本响应已耗尽".to_string())),
            }
        }
    }

    fn text(t: &str) -> Result<SubmitOutput, String> {
        Ok(SubmitOutput::Text {
            text: t.to_string(),
            conversation_url: Some("https://gemini.google.com/app/c1".to_string()),
        })
    }

    fn media(duration: f64) -> Result<SubmitOutput, String> {
        Ok(SubmitOutput::Media {
            url: Some("https://example.com/out.mp4".to_string()),
            duration_secs: Some(duration),
        })
    }

    fn fail(msg: &str) -> Result<SubmitOutput, String> {
        Err(msg.to_string())
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        config: Config,
        store: Arc<ProjectStore>,
        snapshots: Arc<ResponseSnapshots>,
        session: Session,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.projects_dir = tmp.path().join("projects").display().to_string();
        config.outputs_dir = tmp.path().join("outputs").display().to_string();
        config.videos_dir = tmp.path().join("videos").display().to_string();
        config.session.profiles_dir = tmp.path().join("profiles").display().to_string();
        config.session.user_data_root = tmp.path().join("browsers").display().to_string();
        config.retry = RetryPolicy::new(3, Duration::from_millis(0));
        config.video_postcondition_retries = 2;
        config.min_duration_secs = 6.0;

        let store = Arc::new(ProjectStore::new(&config.projects_dir).unwrap());
        let snapshots = Arc::new(ResponseSnapshots::new(&config.outputs_dir));
        let session = Session::new("test_session", config.session.clone());
        Fixture {
            _tmp: tmp,
            config,
            store,
            snapshots,
            session,
        }
    }

    fn test_item(name: &str) -> ItemConfig {
        ItemConfig {
            name: name.to_string(),
            url: None,
            path: Some("/tmp/source.mp4".to_string()),
            script: String::new(),
            duration: 60,
            style: "3d_Pixar".to_string(),
            aspect_ratio: "16:9".to_string(),
            veo_profile: "VEO3 ULTRA".to_string(),
            outputs_per_prompt: 1,
        }
    }

    fn workflow(
        f: &Fixture,
        text_adapter: Arc<MockAdapter>,
        video_adapter: Arc<MockAdapter>,
    ) -> Workflow {
        workflow_with(f, text_adapter, video_adapter)
    }

    fn workflow_with(
        f: &Fixture,
        text_adapter: Arc<dyn CapabilityAdapter>,
        video_adapter: Arc<dyn CapabilityAdapter>,
    ) -> Workflow {
        Workflow::new(
            f.config.clone(),
            f.store.clone(),
            f.snapshots.clone(),
            text_adapter,
            video_adapter,
            f.session.clone(),
        )
    }

    const CHARACTERS_JSON: &str =
        "```json\n{\"characters\": [{\"name\": \"猫\", \"appearance\": \"橘色短毛\"}]}\n```";
    const SCENES_JSON: &str =
        "```json\n{\"scenes\": [{\"id\": 1, \"description\": \"雨夜\"}, {\"id\": 2, \"description\": \"黎明\"}]}\n```";
    const PROMPTS_LIST: &str = "1. An orange cat running in rain\n2. Sunrise over the city\n";

    #[tokio::test]
    async fn test_full_run_reaches_complete() {
        let f = fixture();
        let project = f.store.create(&test_item("全流程")).unwrap();
        let texts = MockAdapter::new(
            "gemini",
            vec![
                text("分析结果"),
                text("故事内容"),
                text(CHARACTERS_JSON),
                text(SCENES_JSON),
                text(PROMPTS_LIST),
            ],
        );
        let videos = MockAdapter::new("flow", vec![media(8.0), media(8.0)]);

        let wf = workflow(&f, texts.clone(), videos.clone());
        let done = wf.run(&project.id()).await.unwrap();

        assert_eq!(done.stage, Stage::Complete);
        assert_eq!(texts.calls(), 5);
        assert_eq!(videos.calls(), 2);

        let loaded = f.store.load(&project.id()).unwrap();
        assert_eq!(loaded.stage, Stage::Complete);
        assert_eq!(loaded.status, "successful");
        assert_eq!(loaded.analysis.as_deref(), Some("分析结果"));
        assert_eq!(loaded.prompts.as_ref().unwrap().len(), 2);
        assert_eq!(loaded.videos.len(), 2);
        assert!(loaded
            .videos
            .iter()
            .all(|v| v.status == GenStatus::Successful));
        assert_eq!(
            loaded.gemini_conversation_url.as_deref(),
            Some("https://gemini.google.com/app/c1")
        );
    }

    #[tokio::test]
    async fn test_resume_skips_completed_stages() {
        let f = fixture();
        let project = f.store.create(&test_item("恢复")).unwrap();
        let id = project.id();
        // 模拟一次跑到 scenes 前崩溃的文档
        f.store
            .update(
                &id,
                json!({
                    "stage": "scenes",
                    "analysis": "已有分析",
                    "content": "已有内容",
                    "characters": {"characters": []},
                }),
            )
            .unwrap();

        let texts = MockAdapter::new("gemini", vec![text(SCENES_JSON), text(PROMPTS_LIST)]);
        let videos = MockAdapter::new("flow", vec![media(7.0), media(7.0)]);

        let wf = workflow(&f, texts.clone(), videos.clone());
        let done = wf.run(&id).await.unwrap();

        // 已完成的阶段零次界面调用
        assert_eq!(texts.calls(), 2);
        assert_eq!(videos.calls(), 2);
        assert_eq!(done.stage, Stage::Complete);
        assert_eq!(done.analysis.as_deref(), Some("已有分析"));
    }

    #[tokio::test]
    async fn test_complete_project_is_idempotent() {
        let f = fixture();
        let project = f.store.create(&test_item("幂等")).unwrap();
        let id = project.id();
        f.store
            .update(
                &id,
                json!({
                    "stage": "complete",
                    "status": "successful",
                    "videos": [{
                        "scene_id": "scene_1",
                        "prompt": "a",
                        "status": "SUCCESSFUL",
                        "attempts": 1
                    }],
                }),
            )
            .unwrap();

        let texts = MockAdapter::new("gemini", vec![]);
        let videos = MockAdapter::new("flow", vec![]);
        let wf = workflow(&f, texts.clone(), videos.clone());
        let done = wf.run(&id).await.unwrap();

        assert_eq!(done.stage, Stage::Complete);
        assert_eq!(texts.calls(), 0);
        assert_eq!(videos.calls(), 0);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_halts_with_stage_intact() {
        let f = fixture();
        let project = f.store.create(&test_item("重试耗尽")).unwrap();
        let id = project.id();

        let texts = MockAdapter::new(
            "gemini",
            vec![fail("超时"), fail("超时"), fail("超时")],
        );
        let videos = MockAdapter::new("flow", vec![]);
        let wf = workflow(&f, texts.clone(), videos.clone());

        let err = wf.run(&id).await.unwrap_err();
        // 恰好 max_attempts 次，不多试
        assert_eq!(texts.calls(), 3);
        assert!(matches!(
            err,
            AppError::Stage(crate::error::StageError::RetryExhausted { .. })
        ));

        // 阶段标记停在 analyze，下次恢复从这里继续
        let loaded = f.store.load(&id).unwrap();
        assert_eq!(loaded.stage, Stage::Analyze);
        assert_eq!(loaded.status, "failed");
    }

    #[tokio::test]
    async fn test_script_short_circuits_analyze() {
        let f = fixture();
        let mut item = test_item("剧本");
        item.script = "第一幕：雨夜的城市。".to_string();
        item.path = None;
        let project = f.store.create(&item).unwrap();

        let texts = MockAdapter::new(
            "gemini",
            vec![
                text("故事内容"),
                text(CHARACTERS_JSON),
                text(SCENES_JSON),
                text(PROMPTS_LIST),
            ],
        );
        let videos = MockAdapter::new("flow", vec![media(8.0), media(8.0)]);
        let wf = workflow(&f, texts.clone(), videos.clone());
        let done = wf.run(&project.id()).await.unwrap();

        // analyze 阶段零次界面调用，分析直接取剧本
        assert_eq!(texts.calls(), 4);
        assert_eq!(done.analysis.as_deref(), Some("第一幕：雨夜的城市。"));
        assert_eq!(done.stage, Stage::Complete);
    }

    #[tokio::test]
    async fn test_failed_videos_only_retry_on_resume() {
        let f = fixture();
        let project = f.store.create(&test_item("失败重试")).unwrap();
        let id = project.id();
        f.store
            .update(
                &id,
                json!({
                    "stage": "complete",
                    "prompts": ["prompt one", "prompt two"],
                    "videos": [
                        {"scene_id": "scene_1", "prompt": "prompt one",
                         "status": "SUCCESSFUL", "duration_secs": 8.0, "attempts": 1},
                        {"scene_id": "scene_2", "prompt": "prompt two",
                         "status": "FAILED", "error": "超时", "attempts": 3}
                    ],
                }),
            )
            .unwrap();

        let texts = MockAdapter::new("gemini", vec![]);
        let videos = MockAdapter::new("flow", vec![media(9.0)]);
        let wf = workflow(&f, texts.clone(), videos.clone());
        let done = wf.run(&id).await.unwrap();

        // 只重跑失败的那条
        assert_eq!(texts.calls(), 0);
        assert_eq!(videos.calls(), 1);
        assert!(done
            .videos
            .iter()
            .all(|v| v.status == GenStatus::Successful));
        assert_eq!(done.status, "successful");
    }

    #[tokio::test]
    async fn test_short_duration_settles_partial() {
        let f = fixture();
        let project = f.store.create(&test_item("时长不足")).unwrap();
        let id = project.id();
        f.store
            .update(
                &id,
                json!({
                    "stage": "videos",
                    "analysis": "a", "content": "c",
                    "characters": {}, "scenes": [{"id": 1}],
                    "prompts": ["only prompt"],
                }),
            )
            .unwrap();

        // 首次 + 2 轮后置条件重试全部时长不足
        let texts = MockAdapter::new("gemini", vec![]);
        let videos = MockAdapter::new("flow", vec![media(3.0), media(4.0), media(3.5)]);
        let wf = workflow(&f, texts.clone(), videos.clone());
        let done = wf.run(&id).await.unwrap();

        assert_eq!(videos.calls(), 3);
        assert_eq!(done.videos.len(), 1);
        assert_eq!(done.videos[0].status, GenStatus::Partial);
        // 保留时长最长的那次产出
        assert_eq!(done.videos[0].duration_secs, Some(4.0));
        assert_eq!(done.status, "partial");
        // PARTIAL 不触发"只重试失败条目"路径
        let videos2 = MockAdapter::new("flow", vec![]);
        let wf2 = workflow(&f, MockAdapter::new("gemini", vec![]), videos2.clone());
        wf2.run(&id).await.unwrap();
        assert_eq!(videos2.calls(), 0);
    }

    /// 每次 submit 前把落盘的 videos 记录下来的假适配器
    struct SnapshotAdapter {
        store: Arc<ProjectStore>,
        project_id: String,
        responses: StdMutex<VecDeque<Result<SubmitOutput, String>>>,
        seen: StdMutex<Vec<Vec<VideoResult>>>,
    }

    #[async_trait]
    impl CapabilityAdapter for SnapshotAdapter {
        fn surface_name(&self) -> &str {
            "flow"
        }

        async fn submit(
            &self,
            _session: &Session,
            _request: SubmitRequest,
        ) -> AppResult<SubmitOutput> {
            let on_disk = self.store.load(&self.project_id).unwrap();
            self.seen.lock().unwrap().push(on_disk.videos);
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(output)) => Ok(output),
                Some(Err(msg)) => Err(AppError::Other(msg)),
                None => Err(AppError::Other("脚本响应已耗尽".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_short_duration_artifact_persisted_before_regen() {
        let f = fixture();
        let project = f.store.create(&test_item("临时落盘")).unwrap();
        let id = project.id();
        f.store
            .update(
                &id,
                json!({
                    "stage": "videos",
                    "analysis": "a", "content": "c",
                    "characters": {}, "scenes": [{"id": 1}],
                    "prompts": ["only prompt"],
                }),
            )
            .unwrap();

        let texts = MockAdapter::new("gemini", vec![]);
        let videos = Arc::new(SnapshotAdapter {
            store: f.store.clone(),
            project_id: id.clone(),
            responses: StdMutex::new(vec![media(3.0), media(8.0)].into()),
            seen: StdMutex::new(Vec::new()),
        });
        let wf = workflow_with(&f, texts, videos.clone());
        let done = wf.run(&id).await.unwrap();
        assert_eq!(done.videos[0].status, GenStatus::Successful);

        let seen = videos.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        // 首次提交前：对齐的槽位已落盘（Pending、无产出）
        assert_eq!(seen[0].len(), 1);
        assert_eq!(seen[0][0].status, GenStatus::Pending);
        assert!(seen[0][0].video_url.is_none());
        // 硬重置重生成前：短时长产出已临时落盘，崩溃也不丢
        assert_eq!(seen[1][0].duration_secs, Some(3.0));
        assert_eq!(
            seen[1][0].video_url.as_deref(),
            Some("https://example.com/out.mp4")
        );
        assert!(seen[1][0].error.as_deref().unwrap().contains("待重生成"));
    }

    #[tokio::test]
    async fn test_postcondition_recovers_to_successful() {
        let f = fixture();
        let project = f.store.create(&test_item("时长恢复")).unwrap();
        let id = project.id();
        f.store
            .update(
                &id,
                json!({
                    "stage": "videos",
                    "analysis": "a", "content": "c",
                    "characters": {}, "scenes": [{"id": 1}],
                    "prompts": ["only prompt"],
                }),
            )
            .unwrap();

        let texts = MockAdapter::new("gemini", vec![]);
        let videos = MockAdapter::new("flow", vec![media(3.0), media(8.0)]);
        let wf = workflow(&f, texts, videos.clone());
        let done = wf.run(&id).await.unwrap();

        assert_eq!(videos.calls(), 2);
        assert_eq!(done.videos[0].status, GenStatus::Successful);
        assert_eq!(done.status, "successful");
    }

    #[tokio::test]
    async fn test_stop_halts_at_stage_boundary() {
        let f = fixture();
        let project = f.store.create(&test_item("停止")).unwrap();
        let id = project.id();

        let texts = MockAdapter::new("gemini", vec![]);
        let videos = MockAdapter::new("flow", vec![]);
        let wf = workflow(&f, texts.clone(), videos.clone());
        wf.stop_handle().store(true, Ordering::SeqCst);

        let halted = wf.run(&id).await.unwrap();
        // 一个阶段都没跑，进度原样保留
        assert_eq!(texts.calls(), 0);
        assert_eq!(halted.stage, Stage::Start);
    }

    #[tokio::test]
    async fn test_missing_upstream_input_walks_back() {
        let f = fixture();
        let project = f.store.create(&test_item("回退")).unwrap();
        let id = project.id();
        // stage 推进到 prompts 但 scenes 丢失（半截文档）
        f.store
            .update(
                &id,
                json!({
                    "stage": "prompts",
                    "analysis": "a",
                    "content": "c",
                    "characters": {"characters": []},
                }),
            )
            .unwrap();

        let texts = MockAdapter::new("gemini", vec![text(SCENES_JSON), text(PROMPTS_LIST)]);
        let videos = MockAdapter::new("flow", vec![media(8.0), media(8.0)]);
        let wf = workflow(&f, texts.clone(), videos.clone());
        let done = wf.run(&id).await.unwrap();

        // 回退补跑 scenes，然后正常前进
        assert_eq!(texts.calls(), 2);
        assert_eq!(done.stage, Stage::Complete);
        assert!(done.scenes.is_some());
    }

    #[tokio::test]
    async fn test_events_published_in_order() {
        let f = fixture();
        let project = f.store.create(&test_item("事件")).unwrap();
        let id = project.id();
        f.store
            .update(
                &id,
                json!({
                    "stage": "videos",
                    "analysis": "a", "content": "c",
                    "characters": {}, "scenes": [{"id": 1}],
                    "prompts": ["p"],
                }),
            )
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let texts = MockAdapter::new("gemini", vec![]);
        let videos = MockAdapter::new("flow", vec![media(8.0)]);
        let wf = workflow(&f, texts, videos).with_events(EventPublisher::new(tx));
        wf.run(&id).await.unwrap();

        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        assert!(matches!(
            events.first(),
            Some(WorkflowEvent::StageStarted {
                stage: Stage::Videos,
                ..
            })
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            WorkflowEvent::VideoSettled {
                status: GenStatus::Successful,
                ..
            }
        )));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::WorkflowCompleted { .. })
        ));
    }
}
