//! 批处理配置
//!
//! 从 TOML 文件加载，启动时读一次，运行中不再重读。
//! 每个条目可覆盖 default_config 中的默认值。

use crate::error::{AppError, ConfigError};
use serde::Deserialize;
use std::path::Path;

/// 批处理配置文件的原始形态
#[derive(Debug, Clone, Deserialize)]
struct RawBatchConfig {
    #[serde(default = "default_max_concurrent")]
    max_concurrent: usize,
    #[serde(default)]
    default_config: RawDefaults,
    #[serde(default)]
    videos: Vec<RawItem>,
}

fn default_max_concurrent() -> usize {
    2
}

#[derive(Debug, Clone, Deserialize)]
struct RawDefaults {
    duration: Option<u32>,
    style: Option<String>,
    aspect_ratio: Option<String>,
    veo_profile: Option<String>,
    outputs_per_prompt: Option<u32>,
}

impl Default for RawDefaults {
    fn default() -> Self {
        Self {
            duration: None,
            style: None,
            aspect_ratio: None,
            veo_profile: None,
            outputs_per_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawItem {
    name: String,
    url: Option<String>,
    path: Option<String>,
    script: Option<String>,
    duration: Option<u32>,
    style: Option<String>,
    aspect_ratio: Option<String>,
    veo_profile: Option<String>,
    outputs_per_prompt: Option<u32>,
}

/// 单个批处理条目（默认值合并完成后）
#[derive(Debug, Clone)]
pub struct ItemConfig {
    pub name: String,
    pub url: Option<String>,
    pub path: Option<String>,
    pub script: String,
    pub duration: u32,
    pub style: String,
    pub aspect_ratio: String,
    pub veo_profile: String,
    pub outputs_per_prompt: u32,
}

/// 批处理配置（合并完成后）
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_concurrent: usize,
    pub items: Vec<ItemConfig>,
}

impl BatchConfig {
    /// 从 TOML 文件加载并合并默认值
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(ConfigError::ParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;

        let raw: RawBatchConfig = toml::from_str(&content).map_err(|e| {
            AppError::Config(ConfigError::ParseFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;

        Ok(Self::merge(raw))
    }

    fn merge(raw: RawBatchConfig) -> Self {
        let d = &raw.default_config;
        let items = raw
            .videos
            .iter()
            .map(|v| ItemConfig {
                name: v.name.clone(),
                url: v.url.clone(),
                path: v.path.clone(),
                script: v.script.clone().unwrap_or_default(),
                duration: v.duration.or(d.duration).unwrap_or(120),
                style: v
                    .style
                    .clone()
                    .or_else(|| d.style.clone())
                    .unwrap_or_else(|| "3d_Pixar".to_string()),
                aspect_ratio: v
                    .aspect_ratio
                    .clone()
                    .or_else(|| d.aspect_ratio.clone())
                    .unwrap_or_else(|| "16:9".to_string()),
                veo_profile: v
                    .veo_profile
                    .clone()
                    .or_else(|| d.veo_profile.clone())
                    .unwrap_or_else(|| "VEO3 ULTRA".to_string()),
                outputs_per_prompt: v.outputs_per_prompt.or(d.outputs_per_prompt).unwrap_or(1),
            })
            .collect();

        Self {
            max_concurrent: raw.max_concurrent.max(1),
            items,
        }
    }
}
