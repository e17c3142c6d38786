//! 文本解析工具
//!
//! 聊天界面返回的是夹杂说明文字的自由文本，这里负责从中抽出结构化部分：
//! 代码围栏里的 JSON、编号的提示词列表等。解析失败一律向上传播，
//! 绝不拿半截数据继续跑流程。

use crate::error::{AppError, AppResult, StageError};
use regex::Regex;
use serde_json::Value as JsonValue;

/// 从自由文本中抽取 JSON
///
/// 优先取 ```json 围栏里的内容，其次取裸围栏，最后尝试整段解析。
pub fn extract_json(stage: &str, text: &str) -> AppResult<JsonValue> {
    let fenced = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```")
        .map_err(|e| AppError::Other(format!("正则构建失败: {}", e)))?;

    if let Some(caps) = fenced.captures(text) {
        if let Some(inner) = caps.get(1) {
            if let Ok(value) = serde_json::from_str(inner.as_str()) {
                return Ok(value);
            }
        }
    }

    // 没有围栏：尝试整段，或第一个 '{'/'[' 到最后一个 '}'/']' 的切片
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    Err(AppError::Stage(StageError::OutputParseFailed {
        stage: stage.to_string(),
        detail: format!("响应中未找到合法 JSON（前 80 字符: {}）", head(text, 80)),
    }))
}

/// 从自由文本中抽取编号列表（"1. xxx" / "1) xxx"）
///
/// 用于提示词阶段：界面往往返回一段开场白加编号的提示词列表。
pub fn extract_numbered_list(stage: &str, text: &str) -> AppResult<Vec<String>> {
    let item_re = Regex::new(r"(?m)^\s*\d+[.)、]\s*(.+)$")
        .map_err(|e| AppError::Other(format!("正则构建失败: {}", e)))?;

    let items: Vec<String> = item_re
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        return Err(AppError::Stage(StageError::OutputParseFailed {
            stage: stage.to_string(),
            detail: format!("响应中未找到编号列表（前 80 字符: {}）", head(text, 80)),
        }));
    }
    Ok(items)
}

fn head(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_fenced() {
        let text = "好的，以下是分析结果：\n```json\n{\"scenes\": [{\"id\": 1}]}\n```\n希望对你有帮助。";
        let value = extract_json("scenes", text).unwrap();
        assert_eq!(value, json!({"scenes": [{"id": 1}]}));
    }

    #[test]
    fn test_extract_json_bare_fence() {
        let text = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json("scenes", text).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_extract_json_unfenced_object() {
        let text = "结果如下 {\"ok\": true} 完毕";
        assert_eq!(extract_json("characters", text).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_extract_json_missing_is_parse_error() {
        let err = extract_json("scenes", "这段话里没有任何结构化数据").unwrap_err();
        assert!(matches!(
            err,
            AppError::Stage(StageError::OutputParseFailed { .. })
        ));
    }

    #[test]
    fn test_extract_numbered_list() {
        let text = "以下是提示词：\n1. 一只猫在雨中奔跑\n2) 夕阳下的城市天际线\n3、森林里的篝火\n";
        let items = extract_numbered_list("prompts", text).unwrap();
        assert_eq!(
            items,
            vec!["一只猫在雨中奔跑", "夕阳下的城市天际线", "森林里的篝火"]
        );
    }

    #[test]
    fn test_extract_numbered_list_empty_is_error() {
        assert!(extract_numbered_list("prompts", "没有列表").is_err());
    }
}
