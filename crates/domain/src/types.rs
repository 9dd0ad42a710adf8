use serde::{Deserialize, Serialize};

/// Supported provider backends (§6 HTTP surface, `provider∈{claude-code|opencode|codex-cli}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    ClaudeCode,
    Opencode,
    CodexCli,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::ClaudeCode => "claude-code",
            Provider::Opencode => "opencode",
            Provider::CodexCli => "codex-cli",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude-code" => Ok(Provider::ClaudeCode),
            "opencode" => Ok(Provider::Opencode),
            "codex-cli" => Ok(Provider::CodexCli),
            other => Err(crate::error::Error::Validation(format!(
                "unknown provider \"{other}\""
            ))),
        }
    }
}

/// Chat message role (§6 `messages:[{role∈{system|user|assistant}, content}]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Capability flags a provider adapter advertises (§4.2, §9 "Capability gating
/// as runtime data" — these are data, not polymorphism).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub resume: bool,
    pub human_loop: bool,
    pub todo_stream: bool,
    pub build_plan_mode: bool,
}

/// Terminal status a provider run (or queue item) may end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Succeeded,
    Failed,
    Canceled,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::Succeeded => "succeeded",
            TerminalStatus::Failed => "failed",
            TerminalStatus::Canceled => "canceled",
        }
    }
}
