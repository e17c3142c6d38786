//! 项目存储 - 基础设施层
//!
//! 一个项目一个 JSON 文档，读-改-写式浅合并更新。
//! 不做文件锁：按约定同一 id 同时只有一个写入者（由编排层保证）。

use crate::error::{AppError, AppResult, StoreError};
use crate::models::batch::ItemConfig;
use crate::models::project::Project;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// 项目存储
///
/// 职责：
/// - 持有项目目录，暴露 list / load / create / update 能力
/// - 不认识 Stage 的先后顺序，不关心流程
pub struct ProjectStore {
    dir: PathBuf,
}

impl ProjectStore {
    /// 创建项目存储，目录不存在则建立
    pub fn new(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Store(StoreError::WriteFailed {
                path: dir.display().to_string(),
                source: Box::new(e),
            })
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// 列出所有项目 id（按文件名排序）
    pub fn list(&self) -> AppResult<Vec<String>> {
        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            AppError::Store(StoreError::ReadFailed {
                path: self.dir.display().to_string(),
                source: Box::new(e),
            })
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// 加载项目原始 JSON
    ///
    /// 文件缺失 → NotFound；文档损坏 → ParseFailed，绝不伪造默认值。
    pub fn load_raw(&self, id: &str) -> AppResult<JsonValue> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(AppError::Store(StoreError::NotFound { id: id.to_string() }));
        }
        let content = fs::read_to_string(&path).map_err(|e| {
            AppError::Store(StoreError::ReadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::Store(StoreError::ParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })
    }

    /// 加载并反序列化为 Project
    pub fn load(&self, id: &str) -> AppResult<Project> {
        let raw = self.load_raw(id)?;
        serde_json::from_value(raw).map_err(|e| {
            AppError::Store(StoreError::ParseFailed {
                path: self.path_for(id).display().to_string(),
                source: Box::new(e),
            })
        })
    }

    /// 整体写入项目文档并刷新 updated_at
    pub fn save(&self, project: &Project) -> AppResult<()> {
        let mut value = serde_json::to_value(project)?;
        value["updated_at"] = JsonValue::String(now_iso());
        self.write_raw(&project.id(), &value)
    }

    /// 按批处理条目创建新项目
    pub fn create(&self, item: &ItemConfig) -> AppResult<Project> {
        let now = now_iso();
        let project = Project {
            name: item.name.clone(),
            created_at: now.clone(),
            updated_at: now,
            stage: Default::default(),
            status: "draft".to_string(),
            video_url: item.url.clone(),
            video_path: item.path.clone(),
            script: item.script.clone(),
            style: item.style.clone(),
            duration: item.duration,
            aspect_ratio: item.aspect_ratio.clone(),
            veo_profile: item.veo_profile.clone(),
            outputs_per_prompt: item.outputs_per_prompt,
            analysis: None,
            content: None,
            characters: None,
            scenes: None,
            prompts: None,
            videos: Vec::new(),
            gemini_conversation_url: None,
        };
        self.save(&project)?;
        debug!("已创建项目文档: {}", project.id());
        Ok(project)
    }

    /// 读-改-写式更新：加载、顶层浅合并、刷新 updated_at、落盘
    ///
    /// 文件缺失 → NotFound。
    pub fn update(&self, id: &str, partial: JsonValue) -> AppResult<()> {
        let mut doc = self.load_raw(id)?;

        if let (Some(doc_map), Some(partial_map)) = (doc.as_object_mut(), partial.as_object()) {
            for (k, v) in partial_map {
                doc_map.insert(k.clone(), v.clone());
            }
            doc_map.insert("updated_at".to_string(), JsonValue::String(now_iso()));
        }

        self.write_raw(id, &doc)
    }

    fn write_raw(&self, id: &str, value: &JsonValue) -> AppResult<()> {
        let path = self.path_for(id);
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&path, content).map_err(|e| {
            AppError::Store(StoreError::WriteFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })
    }
}

/// 阶段原始响应快照
///
/// 把远程界面返回的原文存到 outputs 目录，便于事后排查解析问题。
pub struct ResponseSnapshots {
    dir: PathBuf,
}

impl ResponseSnapshots {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn save(&self, project_id: &str, stage: &str, text: &str) -> AppResult<()> {
        let dir = self.dir.join(project_id);
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Store(StoreError::WriteFailed {
                path: dir.display().to_string(),
                source: Box::new(e),
            })
        })?;
        let path = dir.join(format!("{}.txt", stage));
        fs::write(&path, text).map_err(|e| {
            AppError::Store(StoreError::WriteFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })
    }
}

fn now_iso() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}
