/// 视频风格枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum VideoStyle {
    /// 3D 皮克斯风格
    Pixar3d,
    /// 2D 动漫风格
    Anime2d,
    /// 电影感
    Cinematic,
    /// 实拍
    LiveAction,
}

impl VideoStyle {
    /// 配置文件中使用的标签
    pub fn label(self) -> &'static str {
        match self {
            VideoStyle::Pixar3d => "3d_Pixar",
            VideoStyle::Anime2d => "anime_2d",
            VideoStyle::Cinematic => "cinematic",
            VideoStyle::LiveAction => "live_action",
        }
    }

    /// 提示词中使用的描述
    pub fn prompt_descriptor(self) -> &'static str {
        match self {
            VideoStyle::Pixar3d => "3D Pixar-style animation, soft lighting, expressive characters",
            VideoStyle::Anime2d => "2D anime style, clean line art, vivid colors",
            VideoStyle::Cinematic => "cinematic live-action look, shallow depth of field, film grain",
            VideoStyle::LiveAction => "realistic live-action footage, natural lighting",
        }
    }

    /// 从标签解析风格（精确匹配）
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "3d_Pixar" => Some(VideoStyle::Pixar3d),
            "anime_2d" => Some(VideoStyle::Anime2d),
            "cinematic" => Some(VideoStyle::Cinematic),
            "live_action" => Some(VideoStyle::LiveAction),
            _ => None,
        }
    }

    /// 所有已知风格
    pub fn all() -> [VideoStyle; 4] {
        [
            VideoStyle::Pixar3d,
            VideoStyle::Anime2d,
            VideoStyle::Cinematic,
            VideoStyle::LiveAction,
        ]
    }
}
