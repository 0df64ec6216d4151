use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: crate::llm::Provider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: crate::llm::Provider::default(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: None,
            base_url: None,
        }
    }
}

/// Settings for the interactive chat client.
#[derive(Debug, Deserialize)]
pub struct ChatConfig {
    /// Model calls allowed per user line (tool round trips included).
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_sse_url")]
    pub sse_url: String,
    #[serde(default = "default_http_url")]
    pub http_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            system_prompt: default_system_prompt(),
            sse_url: default_sse_url(),
            http_url: default_http_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds between `tools/list_changed` broadcasts on the streamable HTTP server.
    #[serde(default = "default_tool_list_interval")]
    pub tool_list_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tool_list_interval_secs: default_tool_list_interval(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InstagramConfig {
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    #[serde(default = "default_user_id_env")]
    pub user_id_env: String,
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            graph_url: default_graph_url(),
            user_id_env: default_user_id_env(),
            access_token_env: default_access_token_env(),
        }
    }
}

// Defaults
fn default_model() -> String {
    crate::llm::Provider::default().default_model().into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_steps() -> u32 {
    2
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools whenever they help answer the user."
        .into()
}
fn default_sse_url() -> String {
    format!("http://localhost:{}/sse", default_port())
}
fn default_http_url() -> String {
    format!("http://localhost:{}/mcp", default_port())
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    std::env::var("MCP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8001)
}
fn default_tool_list_interval() -> u64 {
    5
}
fn default_graph_url() -> String {
    "https://graph.facebook.com/v21.0".into()
}
fn default_user_id_env() -> String {
    "IG_USER_ID".into()
}
fn default_access_token_env() -> String {
    "IG_ACCESS_TOKEN".into()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.chat.max_steps == 0 {
            return Err(Error::config("chat.max_steps must be at least 1"));
        }
        if self.server.tool_list_interval_secs == 0 {
            return Err(Error::config(
                "server.tool_list_interval_secs must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;

    #[test]
    fn full_config_parses() {
        let toml = r#"
[llm]
provider = "anthropic"
model = "claude-test"
max_tokens = 2048
api_key_env = "MY_KEY"

[chat]
max_steps = 4
system_prompt = "be terse"
sse_url = "http://example.com:9000/sse"

[server]
host = "0.0.0.0"
port = 9000
tool_list_interval_secs = 30

[instagram]
graph_url = "http://localhost:1"
user_id_env = "MY_IG_USER"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.llm.provider, Provider::Anthropic);
        assert_eq!(config.llm.api_key_env.as_deref(), Some("MY_KEY"));
        assert_eq!(config.chat.max_steps, 4);
        assert_eq!(config.chat.sse_url, "http://example.com:9000/sse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.tool_list_interval_secs, 30);
        assert_eq!(config.instagram.user_id_env, "MY_IG_USER");
        assert_eq!(config.instagram.access_token_env, "IG_ACCESS_TOKEN");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.llm.provider, Provider::Gemini);
        assert_eq!(config.llm.model, "gemini-2.0-flash-001");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.chat.max_steps, 2);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.tool_list_interval_secs, 5);
        assert!(config.chat.http_url.ends_with("/mcp"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_steps() {
        let mut config = Config::default();
        config.chat.max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
