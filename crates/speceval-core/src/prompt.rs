use crate::model::{Guideline, PromptFragment, TestCase};
use serde::Serialize;

/// A code fragment lifted out of the prompt text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub body: String,
}

/// One piece of the task, kept in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPart {
    /// Prose, or an inlined file as `=== path ===` followed by its content.
    Text(String),
    Code(CodeBlock),
}

/// What a backend receives for one attempt.
///
/// Built from a [`TestCase`] without touching its expected answer, so nothing
/// here can leak it. Preparing the same case twice yields equal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedPrompt {
    pub test_id: String,
    pub parts: Vec<PromptPart>,
    pub guidelines: Vec<Guideline>,
}

impl PreparedPrompt {
    pub fn from_test_case(tc: &TestCase) -> Self {
        let parts = tc
            .prompt
            .iter()
            .filter_map(|fragment| match fragment {
                PromptFragment::Text { text } => {
                    let trimmed = text.trim();
                    (!trimmed.is_empty()).then(|| PromptPart::Text(trimmed.to_string()))
                }
                PromptFragment::Code { language, body } => Some(PromptPart::Code(CodeBlock {
                    language: language.clone(),
                    body: body.clone(),
                })),
                PromptFragment::File { path, content } => Some(PromptPart::Text(format!(
                    "=== {} ===\n{}",
                    path,
                    content.trim_end()
                ))),
            })
            .collect();

        Self {
            test_id: tc.id.clone(),
            parts,
            guidelines: tc.guidelines.clone(),
        }
    }

    /// The task with every code block fenced where it appeared.
    pub fn task(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => text.clone(),
                PromptPart::Code(block) => fence(block),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// First non-blank prose line, if any.
    pub fn headline(&self) -> Option<&str> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                PromptPart::Text(text) => Some(text.as_str()),
                PromptPart::Code(_) => None,
            })
            .flat_map(str::lines)
            .map(str::trim)
            .find(|l| !l.is_empty())
    }

    /// Single user message for hosted models: guidelines first, then the task.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if !self.guidelines.is_empty() {
            out.push_str("[[ ## Guidelines ## ]]\n\n");
            for g in &self.guidelines {
                out.push_str(&format!(
                    "=== {} ===\n{}\n\n",
                    g.path.display(),
                    g.content.trim_end()
                ));
            }
        }

        out.push_str("[[ ## Task ## ]]\n\n");
        out.push_str(&self.task());
        out.push('\n');
        out
    }
}

pub(crate) fn fence(block: &CodeBlock) -> String {
    format!(
        "```{}\n{}\n```",
        block.language.as_deref().unwrap_or(""),
        block.body.trim_end_matches('\n')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_case() -> TestCase {
        TestCase::new(
            "review-1",
            vec![
                PromptFragment::Text {
                    text: "Review the snippet below.".into(),
                },
                PromptFragment::Code {
                    language: Some("python".into()),
                    body: "try:\n    run()\nfinally:\n    close()".into(),
                },
                PromptFragment::File {
                    path: "src/app.py".into(),
                    content: "def run(): pass\n".into(),
                },
            ],
            "- SECRET-EXPECTED-ASPECT",
        )
        .with_guideline(Guideline {
            path: PathBuf::from("/repo/python.instructions.md"),
            content: "Prefer context managers.".into(),
        })
    }

    #[test]
    fn prepared_prompt_never_contains_expected_answer() {
        let prompt = PreparedPrompt::from_test_case(&sample_case());
        let rendered = prompt.render();
        assert!(!rendered.contains("SECRET-EXPECTED-ASPECT"));
        let json = serde_json::to_string(&prompt).unwrap();
        assert!(!json.contains("SECRET-EXPECTED-ASPECT"));
    }

    #[test]
    fn preparing_twice_is_identical() {
        let tc = sample_case();
        assert_eq!(
            PreparedPrompt::from_test_case(&tc),
            PreparedPrompt::from_test_case(&tc)
        );
    }

    #[test]
    fn render_keeps_input_order_and_fences_code() {
        let rendered = PreparedPrompt::from_test_case(&sample_case()).render();
        let guideline = rendered.find("Prefer context managers").unwrap();
        let task = rendered.find("Review the snippet").unwrap();
        let code = rendered.find("```python\ntry:").unwrap();
        let file = rendered.find("=== src/app.py ===").unwrap();
        assert!(guideline < task && task < code && code < file);
    }

    #[test]
    fn code_blocks_stay_next_to_the_prose_that_introduces_them() {
        let tc = TestCase::new(
            "compare",
            vec![
                PromptFragment::Text {
                    text: "Here is version A:".into(),
                },
                PromptFragment::Code {
                    language: None,
                    body: "AAA".into(),
                },
                PromptFragment::Text {
                    text: "and version B:".into(),
                },
                PromptFragment::Code {
                    language: Some("c".into()),
                    body: "BBB\n".into(),
                },
                PromptFragment::Text {
                    text: "Which one leaks?".into(),
                },
            ],
            "- B",
        );
        let prompt = PreparedPrompt::from_test_case(&tc);
        assert_eq!(
            prompt.task(),
            "Here is version A:\n\n```\nAAA\n```\n\nand version B:\n\n```c\nBBB\n```\n\nWhich one leaks?"
        );
        assert_eq!(prompt.headline(), Some("Here is version A:"));
        assert!(prompt.render().ends_with("Which one leaks?\n"));
    }

    #[test]
    fn headline_skips_blank_lines() {
        let tc = TestCase::new(
            "t",
            vec![PromptFragment::Text {
                text: "\n\n  first line \nsecond".into(),
            }],
            "",
        );
        let prompt = PreparedPrompt::from_test_case(&tc);
        assert_eq!(prompt.headline(), Some("first line"));
    }
}
