//! 阶段提示词模板 - 流程编排层
//!
//! 每个文本阶段一个构造函数，把前序阶段的产出拼进提示词。
//! 模板要求界面以代码围栏返回 JSON / 编号列表，解析端与之对应。

use crate::models::VideoStyle;

/// analyze：分析上传的源视频
pub fn analyze_prompt() -> String {
    "请仔细观看我上传的视频，详细分析其内容：\n\
     1. 视频的主题和核心信息\n\
     2. 出现的人物、物体和场景\n\
     3. 叙事结构和节奏\n\
     4. 情绪基调和风格\n\
     请用连贯的段落输出分析结果，不要使用列表。"
        .to_string()
}

/// content：根据分析改写故事内容
pub fn content_prompt(analysis: &str, style: Option<VideoStyle>, duration: u32) -> String {
    let style_hint = style
        .map(|s| format!("目标视觉风格为{}。", s.prompt_descriptor()))
        .unwrap_or_default();
    format!(
        "基于以下视频分析，改写出一个适合约 {} 秒短视频的完整故事内容。{}\n\
         要求：保留核心信息，叙事紧凑，有明确的开头、发展和结尾。\n\n\
         视频分析：\n{}",
        duration, style_hint, analysis
    )
}

/// characters：从故事内容中提取角色设定
pub fn characters_prompt(content: &str) -> String {
    format!(
        "从以下故事内容中提取所有角色，为每个角色给出稳定一致的外观设定\
         （跨场景生成时外观不能漂移）。\n\
         请以 JSON 返回，放在 ```json 代码块中，格式：\n\
         {{\"characters\": [{{\"name\": \"...\", \"appearance\": \"...\", \"personality\": \"...\"}}]}}\n\n\
         故事内容：\n{}",
        content
    )
}

/// scenes：把故事拆分为带编号的场景列表
pub fn scenes_prompt(content: &str, characters_json: &str) -> String {
    format!(
        "把以下故事拆分为若干个 8 秒左右的场景，每个场景一个镜头。\n\
         请以 JSON 返回，放在 ```json 代码块中，格式：\n\
         {{\"scenes\": [{{\"id\": 1, \"description\": \"...\", \"characters\": [\"...\"], \"action\": \"...\"}}]}}\n\n\
         角色设定：\n{}\n\n\
         故事内容：\n{}",
        characters_json, content
    )
}

/// prompts：为每个场景生成一条视频生成提示词
pub fn video_prompts_prompt(scenes_json: &str, style: Option<VideoStyle>) -> String {
    let style_hint = style
        .map(|s| format!("所有提示词统一使用{}风格描述。", s.prompt_descriptor()))
        .unwrap_or_default();
    format!(
        "为以下每个场景写一条英文的视频生成提示词（用于 VEO 视频生成器），\
         包含画面主体、动作、镜头语言和光线氛围。{}\n\
         按场景顺序输出编号列表（1. 2. 3. ...），每行一条，不要输出其他内容。\n\n\
         场景列表：\n{}",
        style_hint, scenes_json
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_prompt_carries_inputs() {
        let p = content_prompt("这是一段分析", Some(VideoStyle::Pixar3d), 120);
        assert!(p.contains("这是一段分析"));
        assert!(p.contains("120"));
        assert!(p.contains(VideoStyle::Pixar3d.prompt_descriptor()));
    }

    #[test]
    fn test_scenes_prompt_requests_fenced_json() {
        let p = scenes_prompt("故事", "{}");
        assert!(p.contains("```json"));
        assert!(p.contains("scenes"));
    }

    #[test]
    fn test_video_prompts_requests_numbered_list() {
        let p = video_prompts_prompt("[]", None);
        assert!(p.contains("编号列表"));
    }
}
