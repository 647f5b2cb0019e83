//! Named backend targets (`.speceval/targets.yaml`).
//!
//! ```yaml
//! - name: default
//!   provider: azure
//!   settings:
//!     endpoint: ${AZURE_OPENAI_ENDPOINT}
//!     api_key: ${AZURE_OPENAI_API_KEY}
//!     deployment: gpt-4o
//! ```
//!
//! Settings are resolved into typed values once, when the run is configured.

use crate::errors::TargetError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TARGET: &str = "default";
pub const TARGETS_DIR: &str = ".speceval";
pub const TARGETS_FILE: &str = "targets.yaml";

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_ANTHROPIC_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_AGENT_COMMAND: &str = "code";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const MOCK_MODEL: &str = "mock";

lazy_static! {
    static ref ENV_REF: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Mock,
    Azure,
    Anthropic,
    Vscode,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(ProviderKind::Mock),
            "azure" | "azure-openai" => Some(ProviderKind::Azure),
            "anthropic" => Some(ProviderKind::Anthropic),
            "vscode" | "vscode-copilot" => Some(ProviderKind::Vscode),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Mock => "mock",
            ProviderKind::Azure => "azure",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Vscode => "vscode",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the targets file, settings still unresolved.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetDefinition {
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub settings: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockSettings {
    pub response: Option<String>,
    pub model: String,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            response: None,
            model: MOCK_MODEL.to_string(),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct AzureSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Clone, PartialEq)]
pub struct AnthropicSettings {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

// Keys stay out of debug output.
impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for AnthropicSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicSettings")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub workspace: PathBuf,
    pub command: String,
    pub poll_interval: Duration,
    pub session_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderSettings {
    Mock(MockSettings),
    Azure(AzureSettings),
    Anthropic(AnthropicSettings),
    Vscode(AgentSettings),
}

/// A target whose settings are fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub name: String,
    pub settings: ProviderSettings,
}

impl TargetConfig {
    pub fn mock(response: Option<String>) -> Self {
        Self {
            name: MOCK_MODEL.to_string(),
            settings: ProviderSettings::Mock(MockSettings {
                response,
                ..MockSettings::default()
            }),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match &self.settings {
            ProviderSettings::Mock(_) => ProviderKind::Mock,
            ProviderSettings::Azure(_) => ProviderKind::Azure,
            ProviderSettings::Anthropic(_) => ProviderKind::Anthropic,
            ProviderSettings::Vscode(_) => ProviderKind::Vscode,
        }
    }
}

pub fn parse_targets(path: &Path, text: &str) -> Result<Vec<TargetDefinition>, TargetError> {
    serde_yaml::from_str(text).map_err(|source| TargetError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_targets(path: &Path) -> Result<Vec<TargetDefinition>, TargetError> {
    let text = std::fs::read_to_string(path).map_err(|source| TargetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_targets(path, &text)
}

pub fn find_target<'a>(
    targets: &'a [TargetDefinition],
    name: &str,
) -> Result<&'a TargetDefinition, TargetError> {
    targets.iter().find(|t| t.name == name).ok_or_else(|| {
        let available: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        TargetError::NotFound {
            name: name.to_string(),
            available: if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            },
        }
    })
}

/// CLI flag, then the test file's `target:` key, then `default`.
pub fn select_target_name(cli: Option<&str>, test_file: Option<&str>) -> String {
    cli.or(test_file).unwrap_or(DEFAULT_TARGET).to_string()
}

/// Nearest `.speceval/targets.yaml` walking up from `start` to `repo_root`.
pub fn locate_targets_file(start: &Path, repo_root: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(TARGETS_DIR).join(TARGETS_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if dir == repo_root {
            break;
        }
    }
    let at_root = repo_root.join(TARGETS_DIR).join(TARGETS_FILE);
    at_root.is_file().then_some(at_root)
}

impl TargetDefinition {
    /// Resolves `${VAR}` references through `lookup` and builds typed
    /// settings. Relative paths are taken from `repo_root`.
    pub fn resolve(
        &self,
        repo_root: &Path,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<TargetConfig, TargetError> {
        let kind = ProviderKind::parse(&self.provider).ok_or_else(|| {
            TargetError::UnknownProvider {
                target: self.name.clone(),
                provider: self.provider.clone(),
            }
        })?;
        let s = SettingReader {
            target: &self.name,
            raw: &self.settings,
            lookup,
        };

        let settings = match kind {
            ProviderKind::Mock => ProviderSettings::Mock(MockSettings {
                response: s.optional("response")?,
                model: s.optional("model")?.unwrap_or_else(|| MOCK_MODEL.to_string()),
            }),
            ProviderKind::Azure => ProviderSettings::Azure(AzureSettings {
                endpoint: s.required("endpoint")?,
                api_key: s.required("api_key")?,
                deployment: s.required("deployment")?,
                api_version: s
                    .optional("api_version")?
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                temperature: s.parsed("temperature")?,
                max_tokens: s.parsed("max_tokens")?,
            }),
            ProviderKind::Anthropic => ProviderSettings::Anthropic(AnthropicSettings {
                api_key: s.required("api_key")?,
                model: s.required("model")?,
                max_tokens: s
                    .parsed("max_tokens")?
                    .unwrap_or(DEFAULT_ANTHROPIC_MAX_TOKENS),
                temperature: s.parsed("temperature")?,
            }),
            ProviderKind::Vscode => {
                let poll_ms: u64 = s
                    .parsed("poll_interval_ms")?
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
                if poll_ms == 0 {
                    return Err(TargetError::InvalidSetting {
                        target: self.name.clone(),
                        key: "poll_interval_ms".into(),
                        message: "must be greater than zero".into(),
                    });
                }
                ProviderSettings::Vscode(AgentSettings {
                    workspace: repo_root.join(s.required("workspace")?),
                    command: s
                        .optional("command")?
                        .unwrap_or_else(|| DEFAULT_AGENT_COMMAND.to_string()),
                    poll_interval: Duration::from_millis(poll_ms),
                    session_root: s
                        .optional("session_root")?
                        .map(|p| repo_root.join(p))
                        .unwrap_or_else(|| repo_root.join(TARGETS_DIR).join("vscode-copilot")),
                })
            }
        };

        Ok(TargetConfig {
            name: self.name.clone(),
            settings,
        })
    }
}

struct SettingReader<'a> {
    target: &'a str,
    raw: &'a BTreeMap<String, serde_yaml::Value>,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl SettingReader<'_> {
    fn optional(&self, key: &str) -> Result<Option<String>, TargetError> {
        let Some(value) = self.raw.get(key) else {
            return Ok(None);
        };
        let text = match value {
            serde_yaml::Value::Null => return Ok(None),
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            _ => {
                return Err(TargetError::InvalidSetting {
                    target: self.target.to_string(),
                    key: key.to_string(),
                    message: "expected a scalar value".into(),
                })
            }
        };
        self.interpolate(key, &text).map(Some)
    }

    fn required(&self, key: &str) -> Result<String, TargetError> {
        match self.optional(key)? {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(TargetError::MissingSetting {
                target: self.target.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>, TargetError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key)? {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| TargetError::InvalidSetting {
                    target: self.target.to_string(),
                    key: key.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    fn interpolate(&self, key: &str, text: &str) -> Result<String, TargetError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in ENV_REF.captures_iter(text) {
            let (Some(whole), Some(var)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = (self.lookup)(var.as_str()).ok_or_else(|| TargetError::MissingEnv {
                target: self.target.to_string(),
                key: key.to_string(),
                var: var.as_str().to_string(),
            })?;
            out.push_str(&text[last..whole.start()]);
            out.push_str(&value);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

/// Process environment lookup for [`TargetDefinition::resolve`].
pub fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TARGETS: &str = r#"
- name: default
  provider: azure
  settings:
    endpoint: https://${AZURE_HOST}/
    api_key: ${AZURE_KEY}
    deployment: gpt-4o
    max_tokens: 512
- name: claude
  provider: anthropic
  settings:
    api_key: ${ANTHROPIC_KEY}
    model: claude-sonnet
- name: agent
  provider: vscode-copilot
  settings:
    workspace: ws/project.code-workspace
- name: canned
  provider: mock
  settings:
    response: "- ok"
"#;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn defs() -> Vec<TargetDefinition> {
        parse_targets(Path::new("targets.yaml"), TARGETS).unwrap()
    }

    #[test]
    fn resolves_azure_with_env_interpolation_and_defaults() {
        let lookup = lookup_from(&[("AZURE_HOST", "example.openai.azure.com"), ("AZURE_KEY", "k")]);
        let defs = defs();
        let cfg = find_target(&defs, "default")
            .unwrap()
            .resolve(Path::new("/repo"), &lookup)
            .unwrap();
        let ProviderSettings::Azure(az) = cfg.settings else {
            panic!("expected azure settings");
        };
        assert_eq!(az.endpoint, "https://example.openai.azure.com/");
        assert_eq!(az.api_key, "k");
        assert_eq!(az.api_version, DEFAULT_AZURE_API_VERSION);
        assert_eq!(az.max_tokens, Some(512));
        assert!(!format!("{:?}", az).contains("\"k\""));
    }

    #[test]
    fn unset_variable_is_reported_with_its_name() {
        let lookup = lookup_from(&[]);
        let defs = defs();
        let err = find_target(&defs, "claude")
            .unwrap()
            .resolve(Path::new("/repo"), &lookup)
            .unwrap_err();
        assert!(
            matches!(err, TargetError::MissingEnv { ref var, .. } if var == "ANTHROPIC_KEY"),
            "{err}"
        );
    }

    #[test]
    fn agent_defaults_are_rooted_in_repo() {
        let defs = defs();
        let cfg = find_target(&defs, "agent")
            .unwrap()
            .resolve(Path::new("/repo"), &lookup_from(&[]))
            .unwrap();
        assert_eq!(cfg.kind(), ProviderKind::Vscode);
        let ProviderSettings::Vscode(agent) = cfg.settings else {
            panic!("expected agent settings");
        };
        assert_eq!(agent.command, DEFAULT_AGENT_COMMAND);
        assert_eq!(agent.poll_interval, Duration::from_millis(1000));
        assert_eq!(
            agent.workspace,
            PathBuf::from("/repo/ws/project.code-workspace")
        );
        assert_eq!(
            agent.session_root,
            PathBuf::from("/repo/.speceval/vscode-copilot")
        );
    }

    #[test]
    fn mock_response_is_kept_verbatim() {
        let defs = defs();
        let cfg = find_target(&defs, "canned")
            .unwrap()
            .resolve(Path::new("/repo"), &lookup_from(&[]))
            .unwrap();
        assert_eq!(cfg, TargetConfig {
            name: "canned".into(),
            settings: ProviderSettings::Mock(MockSettings {
                response: Some("- ok".into()),
                model: MOCK_MODEL.into(),
            }),
        });
    }

    #[test]
    fn unknown_target_lists_available_names() {
        let defs = defs();
        let err = find_target(&defs, "nope").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("default, claude, agent, canned"), "{msg}");
    }

    #[test]
    fn unknown_provider_and_bad_numbers_are_rejected() {
        let defs = parse_targets(
            Path::new("t.yaml"),
            "- { name: a, provider: bedrock }\n- { name: b, provider: anthropic, settings: { api_key: x, model: m, max_tokens: lots } }\n",
        )
        .unwrap();
        let lookup = lookup_from(&[]);
        assert!(matches!(
            defs[0].resolve(Path::new("/r"), &lookup),
            Err(TargetError::UnknownProvider { .. })
        ));
        assert!(matches!(
            defs[1].resolve(Path::new("/r"), &lookup),
            Err(TargetError::InvalidSetting { ref key, .. }) if key == "max_tokens"
        ));
    }

    #[test]
    fn target_name_precedence() {
        assert_eq!(select_target_name(Some("cli"), Some("file")), "cli");
        assert_eq!(select_target_name(None, Some("file")), "file");
        assert_eq!(select_target_name(None, None), DEFAULT_TARGET);
    }

    #[test]
    fn locates_nearest_targets_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join(".speceval")).unwrap();
        std::fs::write(root.join(".speceval/targets.yaml"), "[]").unwrap();
        let nested = root.join("evals/deep");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(
            locate_targets_file(&nested, root),
            Some(root.join(".speceval/targets.yaml"))
        );

        std::fs::create_dir_all(root.join("evals/.speceval")).unwrap();
        std::fs::write(root.join("evals/.speceval/targets.yaml"), "[]").unwrap();
        assert_eq!(
            locate_targets_file(&nested, root),
            Some(root.join("evals/.speceval/targets.yaml"))
        );
    }
}
