//! 从模型回复中提取围栏代码块
//!
//! 只保留标签属于支持语言的块，按文档顺序返回；其它标签（含无标签块）跳过。

use std::sync::OnceLock;

use regex::Regex;

use crate::runtime::Language;

/// 一个待执行的代码块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Language,
    pub code: String,
}

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    FENCE_RE.get_or_init(|| {
        Regex::new(r"(?ms)^```[ \t]*([A-Za-z0-9#+_-]+)[ \t]*\r?\n(.*?)^```[ \t]*\r?$")
            .expect("code fence pattern is valid")
    })
}

/// 提取所有支持语言的代码块（文档顺序）
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    fence_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let tag = caps.get(1)?.as_str();
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            match Language::from_tag(tag) {
                Some(language) => Some(CodeBlock {
                    language,
                    code: body.trim_end_matches(['\r', '\n']).to_string(),
                }),
                None => {
                    tracing::debug!(tag = %tag, "skip unsupported code block");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_in_document_order() {
        let text = "First:\n```python\nx = 1\n```\nthen\n```csharp\nConsole.WriteLine(1);\n```\n```python\nprint(x)\n```\n";
        let blocks = extract_code_blocks(text);
        let langs: Vec<_> = blocks.iter().map(|b| b.language).collect();
        assert_eq!(langs, vec![Language::Python, Language::CSharp, Language::Python]);
        assert_eq!(blocks[0].code, "x = 1");
        assert_eq!(blocks[2].code, "print(x)");
    }

    #[test]
    fn test_skips_unsupported_and_untagged() {
        let text = "```rust\nfn main() {}\n```\n```\nplain\n```\n```pwsh\nWrite-Output 3\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(
            blocks,
            vec![CodeBlock {
                language: Language::Pwsh,
                code: "Write-Output 3".into(),
            }]
        );
    }

    #[test]
    fn test_multiline_body_and_crlf() {
        let text = "```py\r\nimport math\r\nprint(math.pi)\r\n```\r\n";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, Language::Python);
        assert_eq!(blocks[0].code, "import math\r\nprint(math.pi)");
    }

    #[test]
    fn test_no_blocks() {
        assert!(extract_code_blocks("I cannot resolve this task using code").is_empty());
    }
}
