//! 项目文档模型
//!
//! 一个项目对应一次流水线运行的持久化记录，字段随阶段推进逐步累积，
//! 从不自动删除。

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 流水线阶段（有序）
///
/// 持久化的 `stage` 含义是"下一个要运行的阶段"：
/// - 只能前进，除非显式重置
/// - `Complete` 为终态，幂等（除非存储的视频结果中仍有 FAILED）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Start,
    Analyze,
    Content,
    Characters,
    Scenes,
    Prompts,
    Videos,
    Complete,
}

impl Stage {
    /// 阶段顺序表
    pub const ORDER: [Stage; 8] = [
        Stage::Start,
        Stage::Analyze,
        Stage::Content,
        Stage::Characters,
        Stage::Scenes,
        Stage::Prompts,
        Stage::Videos,
        Stage::Complete,
    ];

    /// 下一个阶段（Complete 保持不变）
    pub fn next(self) -> Stage {
        let idx = self.index();
        if idx + 1 < Self::ORDER.len() {
            Self::ORDER[idx + 1]
        } else {
            Stage::Complete
        }
    }

    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).unwrap_or(0)
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Analyze => "analyze",
            Stage::Content => "content",
            Stage::Characters => "characters",
            Stage::Scenes => "scenes",
            Stage::Prompts => "prompts",
            Stage::Videos => "videos",
            Stage::Complete => "complete",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Start
    }
}

/// 单条生成结果的状态
///
/// PARTIAL 表示产出了结果但未通过结构性后置条件（例如时长不足），
/// 与硬失败 FAILED 区分开。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenStatus {
    Pending,
    Successful,
    Failed,
    Partial,
}

/// 单个场景的视频生成结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResult {
    pub scene_id: String,
    pub prompt: String,
    pub status: GenStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 实测时长（秒），仅在产出后可得
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub attempts: usize,
}

/// 项目文档（WorkItem）
///
/// 磁盘上一个 `<id>.json` 对应一个项目；未知字段在加载时保留默认，
/// 文档损坏则报结构化错误，绝不伪造默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub stage: Stage,
    #[serde(default)]
    pub status: String,

    // --- 静态输入 ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
    /// 用户给定的剧本，非空时跳过 analyze 阶段
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub aspect_ratio: String,
    #[serde(default)]
    pub veo_profile: String,
    #[serde(default)]
    pub outputs_per_prompt: u32,

    // --- 各阶段输出（逐步累积） ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenes: Option<Vec<JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Vec<String>>,
    #[serde(default)]
    pub videos: Vec<VideoResult>,

    // --- 自由元数据 ---
    /// 会话中发现的远程会话 URL，恢复时重新进入同一对话
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_conversation_url: Option<String>,
}

impl Project {
    /// 项目 id（存储文件名），由名称规范化得到
    pub fn id(&self) -> String {
        Self::id_for_name(&self.name)
    }

    pub fn id_for_name(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// 是否存在 FAILED 的视频子结果
    pub fn has_failed_videos(&self) -> bool {
        self.videos.iter().any(|v| v.status == GenStatus::Failed)
    }

    /// 统计各状态数量 (successful, partial, failed)
    pub fn video_counts(&self) -> (usize, usize, usize) {
        let mut ok = 0;
        let mut partial = 0;
        let mut failed = 0;
        for v in &self.videos {
            match v.status {
                GenStatus::Successful => ok += 1,
                GenStatus::Partial => partial += 1,
                GenStatus::Failed => failed += 1,
                GenStatus::Pending => {}
            }
        }
        (ok, partial, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_advances() {
        assert_eq!(Stage::Start.next(), Stage::Analyze);
        assert_eq!(Stage::Analyze.next(), Stage::Content);
        assert_eq!(Stage::Videos.next(), Stage::Complete);
        // 终态不再前进
        assert_eq!(Stage::Complete.next(), Stage::Complete);
    }

    #[test]
    fn test_stage_is_ordered() {
        assert!(Stage::Analyze < Stage::Videos);
        assert!(Stage::Complete > Stage::Prompts);
    }

    #[test]
    fn test_stage_serde_lowercase() {
        let json = serde_json::to_string(&Stage::Characters).unwrap();
        assert_eq!(json, "\"characters\"");
        let back: Stage = serde_json::from_str("\"videos\"").unwrap();
        assert_eq!(back, Stage::Videos);
    }

    #[test]
    fn test_gen_status_serde_screaming() {
        let json = serde_json::to_string(&GenStatus::Partial).unwrap();
        assert_eq!(json, "\"PARTIAL\"");
        let back: GenStatus = serde_json::from_str("\"SUCCESSFUL\"").unwrap();
        assert_eq!(back, GenStatus::Successful);
    }

    #[test]
    fn test_project_id_sanitized() {
        assert_eq!(Project::id_for_name("My Video #1"), "My_Video__1");
    }

    #[test]
    fn test_video_counts() {
        let mut p: Project = serde_json::from_value(serde_json::json!({
            "name": "t",
            "created_at": "2025-01-01T00:00:00",
            "updated_at": "2025-01-01T00:00:00"
        }))
        .unwrap();
        p.videos = vec![
            VideoResult {
                scene_id: "scene_1".into(),
                prompt: "a".into(),
                status: GenStatus::Successful,
                video_url: None,
                error: None,
                duration_secs: None,
                attempts: 1,
            },
            VideoResult {
                scene_id: "scene_2".into(),
                prompt: "b".into(),
                status: GenStatus::Failed,
                video_url: None,
                error: Some("boom".into()),
                duration_secs: None,
                attempts: 3,
            },
        ];
        assert_eq!(p.video_counts(), (1, 0, 1));
        assert!(p.has_failed_videos());
    }
}
