pub mod claude_code;
pub mod codex_cli;
pub mod opencode;
pub mod registry;
pub mod traits;
pub(crate) mod http_agent;
pub(crate) mod sse;
pub(crate) mod util;

pub use claude_code::ClaudeCodeAdapter;
pub use codex_cli::CodexCliAdapter;
pub use opencode::OpencodeAdapter;
pub use registry::{ProviderInitError, ProviderRegistry};
pub use traits::{Handle, ProviderAdapter, ProviderChunk, RunRequest};
