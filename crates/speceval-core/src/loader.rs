//! YAML test file loading.
//!
//! ```yaml
//! target: default
//! testcases:
//!   - id: example
//!     messages:
//!       - role: user
//!         content:
//!           - { type: text, value: "Review this" }
//!           - { type: file, value: prompts/python.instructions.md }
//!       - role: assistant
//!         content: "- uses try/finally"
//! ```

use crate::errors::LoadError;
use crate::model::{Guideline, PromptFragment, TestCase, DEFAULT_GRADER};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct RawSuite {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    grader: Option<String>,
    #[serde(default)]
    testcases: Vec<RawCase>,
}

#[derive(Debug, Deserialize)]
struct RawCase {
    id: String,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    grader: Option<String>,
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    role: String,
    #[serde(default)]
    content: RawContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Segments(Vec<RawSegment>),
}

impl Default for RawContent {
    fn default() -> Self {
        RawContent::Text(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawSegment {
    Text { value: String },
    File { value: String },
}

/// A loaded test file.
#[derive(Debug, Clone)]
pub struct TestSuite {
    pub path: PathBuf,
    /// `target:` key of the file, if present.
    pub target: Option<String>,
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    /// File name without extension, used to name the default result log.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results".to_string())
    }
}

/// Where relative references in a test file are looked up.
struct Resolver<'a> {
    test_dir: &'a Path,
    repo_root: &'a Path,
    cwd: Option<PathBuf>,
}

pub fn load_test_file(path: &Path, repo_root: &Path) -> Result<TestSuite, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawSuite = serde_yaml::from_str(&text).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let path = path.canonicalize().map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let test_dir = path.parent().unwrap_or(Path::new("."));
    let repo_root = repo_root
        .canonicalize()
        .unwrap_or_else(|_| repo_root.to_path_buf());
    let resolver = Resolver {
        test_dir,
        repo_root: &repo_root,
        cwd: std::env::current_dir().ok(),
    };

    let suite_grader = raw.grader.unwrap_or_else(|| DEFAULT_GRADER.to_string());
    let mut seen = HashSet::new();
    let mut cases = Vec::with_capacity(raw.testcases.len());
    for rc in raw.testcases {
        if !seen.insert(rc.id.clone()) {
            return Err(LoadError::DuplicateId(rc.id));
        }
        cases.push(build_case(rc, &suite_grader, &resolver)?);
    }

    tracing::debug!(
        path = %path.display(),
        cases = cases.len(),
        "loaded test file"
    );

    Ok(TestSuite {
        target: raw.target,
        path,
        cases,
    })
}

fn build_case(rc: RawCase, suite_grader: &str, resolver: &Resolver<'_>) -> Result<TestCase, LoadError> {
    let mut prompt = Vec::new();
    let mut guidelines: Vec<Guideline> = Vec::new();
    let mut expected: Option<String> = None;

    for msg in rc.messages {
        if msg.role.eq_ignore_ascii_case("assistant") {
            expected = Some(assistant_text(&rc.id, msg.content, resolver)?);
            continue;
        }
        let segments = match msg.content {
            RawContent::Text(value) => vec![RawSegment::Text { value }],
            RawContent::Segments(segments) => segments,
        };
        for segment in segments {
            match segment {
                RawSegment::Text { value } => prompt.extend(split_code_fences(&value)),
                RawSegment::File { value } => {
                    let resolved = resolver.resolve(&rc.id, &value)?;
                    let content = read_fragment(&rc.id, &resolved)?;
                    if is_guideline_file(&value) {
                        if !guidelines.iter().any(|g| g.path == resolved) {
                            guidelines.push(Guideline {
                                path: resolved,
                                content,
                            });
                        }
                    } else {
                        prompt.push(PromptFragment::File {
                            path: value,
                            content,
                        });
                    }
                }
            }
        }
    }

    let expected = expected.ok_or_else(|| LoadError::MissingExpected {
        test_id: rc.id.clone(),
    })?;

    let mut tc = TestCase::new(rc.id, prompt, expected);
    tc.outcome = rc.outcome;
    tc.grader = rc.grader.unwrap_or_else(|| suite_grader.to_string());
    tc.guidelines = guidelines;
    Ok(tc)
}

fn assistant_text(
    test_id: &str,
    content: RawContent,
    resolver: &Resolver<'_>,
) -> Result<String, LoadError> {
    match content {
        RawContent::Text(text) => Ok(text),
        RawContent::Segments(segments) => {
            let mut parts = Vec::with_capacity(segments.len());
            for segment in segments {
                match segment {
                    RawSegment::Text { value } => parts.push(value),
                    RawSegment::File { value } => {
                        let resolved = resolver.resolve(test_id, &value)?;
                        parts.push(read_fragment(test_id, &resolved)?);
                    }
                }
            }
            Ok(parts.join("\n"))
        }
    }
}

fn read_fragment(test_id: &str, path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::ReadFragment {
        test_id: test_id.to_string(),
        path: path.to_path_buf(),
        source,
    })
}

impl Resolver<'_> {
    /// Absolute path of a file reference.
    ///
    /// A leading `/` means "relative to the repository": it is tried against
    /// each ancestor of the test directory, nearest first, up to the repo root.
    fn resolve(&self, test_id: &str, reference: &str) -> Result<PathBuf, LoadError> {
        self.candidates(reference)
            .into_iter()
            .find(|p| p.is_file())
            .and_then(|p| p.canonicalize().ok())
            .ok_or_else(|| LoadError::MissingFile {
                test_id: test_id.to_string(),
                reference: reference.to_string(),
            })
    }

    fn candidates(&self, reference: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(rel) = reference.strip_prefix('/') {
            for ancestor in self.test_dir.ancestors() {
                out.push(ancestor.join(rel));
                if ancestor == self.repo_root {
                    break;
                }
            }
            out.push(self.repo_root.join(rel));
            out.push(PathBuf::from(reference));
        } else {
            out.push(self.test_dir.join(reference));
            out.push(self.repo_root.join(reference));
            if let Some(cwd) = &self.cwd {
                out.push(cwd.join(reference));
            }
        }
        out
    }
}

/// `*.instructions.md`, `*.prompt.md`, or anything under an `instructions/`
/// directory.
pub fn is_guideline_file(reference: &str) -> bool {
    let normalized = reference.replace('\\', "/");
    if normalized.ends_with(".instructions.md") || normalized.ends_with(".prompt.md") {
        return true;
    }
    let mut components: Vec<&str> = normalized.split('/').collect();
    components.pop();
    components.iter().any(|c| *c == "instructions")
}

/// Splits fenced code blocks out of a text segment. Unterminated fences stay
/// text.
pub fn split_code_fences(text: &str) -> Vec<PromptFragment> {
    let mut out = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(info) = line.trim_start().strip_prefix("```") else {
            prose.push(line);
            continue;
        };

        let mut body: Vec<&str> = Vec::new();
        let mut closed = false;
        for inner in lines.by_ref() {
            if inner.trim_start().starts_with("```") {
                closed = true;
                break;
            }
            body.push(inner);
        }

        if !closed {
            prose.push(line);
            prose.extend(body);
            break;
        }

        flush_prose(&mut prose, &mut out);
        let language = info.trim();
        out.push(PromptFragment::Code {
            language: (!language.is_empty()).then(|| language.to_string()),
            body: body.join("\n"),
        });
    }
    flush_prose(&mut prose, &mut out);
    out
}

fn flush_prose(prose: &mut Vec<&str>, out: &mut Vec<PromptFragment>) {
    let text = prose.join("\n");
    prose.clear();
    if !text.trim().is_empty() {
        out.push(PromptFragment::Text {
            text: text.trim().to_string(),
        });
    }
}

/// Nearest ancestor of `start` containing `.git`, else `start` itself.
pub fn find_repo_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .unwrap_or(start)
        .to_path_buf()
}
