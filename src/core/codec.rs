//! State 编解码
//!
//! State 以单行 JSON 放在带专用标签（`codecrew-state`）的围栏代码块中：
//! 首行为三个反引号加标签，第二行为 `{"step":"write_code","task":"...","code":"..."}`，末行为三个反引号。
//!
//! 解码是宽容的：整段文本不是这种格式（普通聊天文本、LLM 原始回复、损坏的 JSON）时返回 None，
//! 调用方将其当作普通文本消息处理，绝不让循环因此崩溃。

use crate::core::State;

/// 围栏标签，用于把 State 与同一通道中的其它文本区分开
pub const STATE_FENCE_TAG: &str = "codecrew-state";

/// 编码：State -> 围栏 JSON 文本
///
/// JSON 为单行（字符串内换行被转义），因此 code 字段中即使包含 ``` 也不会提前闭合围栏。
pub fn encode_state(state: &State) -> String {
    // State 只含字符串字段，序列化不会失败；失败时退化为空对象以保持签名无 Result
    let json = serde_json::to_string(state).unwrap_or_else(|e| {
        tracing::error!("state serialization failed: {}", e);
        "{}".to_string()
    });
    format!("```{STATE_FENCE_TAG}\n{json}\n```")
}

/// 解码：文本 -> State；非 State 文本返回 None
pub fn decode_state(text: &str) -> Option<State> {
    let body = text
        .trim()
        .strip_prefix("```")?
        .strip_prefix(STATE_FENCE_TAG)?
        .strip_suffix("```")?;
    // 标签后必须紧跟换行，避免 ```codecrew-stateful 之类的误判
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))?;
    match serde_json::from_str::<State>(body.trim()) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::debug!("text carries no valid state: {}", e);
            None
        }
    }
}
