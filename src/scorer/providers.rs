use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Gemini,
    Claude,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Claude => "claude",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Claude => "claude-3-5-sonnet-latest",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSelection {
    pub provider: ProviderKind,
    pub requested_model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Builder-style LLM client: accumulate prompt inputs, then force exactly one
/// tool call and hand back its arguments.
pub trait Provider: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn register_tool(self, tool: ToolSpec) -> Self;
    fn call_tool(self, tool_name: &str) -> ProviderFuture;
}

/// Prompt state shared by all three backends.
#[derive(Debug, Clone, Default)]
struct Exchange {
    system: Vec<String>,
    user: Vec<String>,
    tools: Vec<ToolSpec>,
}

impl Exchange {
    fn system_text(&self) -> String {
        self.system.join("\n\n")
    }

    fn find_tool(&self, name: &str) -> Result<ToolSpec> {
        self.tools
            .iter()
            .find(|tool| tool.name == name)
            .cloned()
            .ok_or_else(|| anyhow!("tool '{}' not registered", name))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAI {
    key: String,
    model: String,
    exchange: Exchange,
}

impl OpenAI {
    pub fn new(key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: model.into(),
            exchange: Exchange::default(),
        }
    }
}

impl Provider for OpenAI {
    fn append_system_input(mut self, input: String) -> Self {
        self.exchange.system.push(input);
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.exchange.user.push(input);
        self
    }

    fn register_tool(mut self, tool: ToolSpec) -> Self {
        self.exchange.tools.push(tool);
        self
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            let tool = self.exchange.find_tool(&tool_name)?;
            let base = std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
            let url = format!("{}/chat/completions", base);

            let mut messages = Vec::new();
            let system = self.exchange.system_text();
            if !system.trim().is_empty() {
                messages.push(json!({"role": "system", "content": system}));
            }
            for input in &self.exchange.user {
                messages.push(json!({"role": "user", "content": input}));
            }

            let body = json!({
                "model": self.model,
                "messages": messages,
                "tools": [
                    {
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters
                        }
                    }
                ],
                "tool_choice": {"type": "function", "function": {"name": tool.name}}
            });

            let response = reqwest::Client::new()
                .post(&url)
                .bearer_auth(&self.key)
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach OpenAI")?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!(
                    "OpenAI API error ({}): {}",
                    status,
                    extract_api_error(&text).unwrap_or(text)
                ));
            }
            openai_tool_args(&text, &tool_name)
        })
    }
}

fn openai_tool_args(text: &str, tool_name: &str) -> Result<Value> {
    #[derive(Deserialize)]
    struct Response {
        choices: Vec<Choice>,
    }
    #[derive(Deserialize)]
    struct Choice {
        message: ChoiceMessage,
    }
    #[derive(Deserialize)]
    struct ChoiceMessage {
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    }
    #[derive(Deserialize)]
    struct ToolCall {
        function: FunctionCall,
    }
    #[derive(Deserialize)]
    struct FunctionCall {
        name: String,
        arguments: String,
    }

    let payload: Response =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| anyhow!("no tool call returned from OpenAI"))?;
    if call.function.name != tool_name {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            call.function.name
        ));
    }
    serde_json::from_str(&call.function.arguments)
        .with_context(|| "failed to parse OpenAI tool arguments")
}

#[derive(Debug, Clone)]
pub struct Gemini {
    key: String,
    model: String,
    exchange: Exchange,
}

impl Gemini {
    pub fn new(key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: model.into(),
            exchange: Exchange::default(),
        }
    }
}

impl Provider for Gemini {
    fn append_system_input(mut self, input: String) -> Self {
        self.exchange.system.push(input);
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.exchange.user.push(input);
        self
    }

    fn register_tool(mut self, tool: ToolSpec) -> Self {
        self.exchange.tools.push(tool);
        self
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            let tool = self.exchange.find_tool(&tool_name)?;
            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            );

            let contents = self
                .exchange
                .user
                .iter()
                .map(|input| json!({"role": "user", "parts": [{"text": input}]}))
                .collect::<Vec<_>>();
            let system = self.exchange.system_text();
            let system_instruction = if system.trim().is_empty() {
                Value::Null
            } else {
                json!({"parts": [{"text": system}]})
            };

            let body = json!({
                "contents": contents,
                "systemInstruction": system_instruction,
                "tools": [
                    {
                        "function_declarations": [
                            {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.parameters
                            }
                        ]
                    }
                ],
                "tool_config": {
                    "function_calling_config": {
                        "mode": "ANY",
                        "allowed_function_names": [tool.name]
                    }
                }
            });

            let response = reqwest::Client::new()
                .post(&url)
                .header("x-goog-api-key", &self.key)
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach Gemini")?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!(
                    "Gemini API error ({}): {}",
                    status,
                    extract_api_error(&text).unwrap_or(text)
                ));
            }
            gemini_tool_args(&text, &tool_name)
        })
    }
}

fn gemini_tool_args(text: &str, tool_name: &str) -> Result<Value> {
    #[derive(Deserialize)]
    struct Response {
        candidates: Vec<Candidate>,
    }
    #[derive(Deserialize)]
    struct Candidate {
        content: Option<Content>,
    }
    #[derive(Deserialize)]
    struct Content {
        parts: Vec<Part>,
    }
    #[derive(Deserialize)]
    struct Part {
        #[serde(rename = "functionCall")]
        function_call: Option<FunctionCall>,
    }
    #[derive(Deserialize)]
    struct FunctionCall {
        name: String,
        #[serde(default)]
        args: Value,
    }

    let payload: Response =
        serde_json::from_str(text).with_context(|| "failed to parse Gemini response JSON")?;
    let content = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))?;
    for part in &content.parts {
        if let Some(call) = &part.function_call {
            if call.name == tool_name {
                return Ok(call.args.clone());
            }
        }
    }
    Err(anyhow!("no tool call returned from Gemini"))
}

#[derive(Debug, Clone)]
pub struct Claude {
    key: String,
    model: String,
    exchange: Exchange,
}

impl Claude {
    pub fn new(key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: model.into(),
            exchange: Exchange::default(),
        }
    }
}

impl Provider for Claude {
    fn append_system_input(mut self, input: String) -> Self {
        self.exchange.system.push(input);
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.exchange.user.push(input);
        self
    }

    fn register_tool(mut self, tool: ToolSpec) -> Self {
        self.exchange.tools.push(tool);
        self
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            let tool = self.exchange.find_tool(&tool_name)?;
            let url = std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".to_string());

            let messages = self
                .exchange
                .user
                .iter()
                .map(|input| json!({"role": "user", "content": input}))
                .collect::<Vec<_>>();
            let system = self.exchange.system_text();
            let system_value = if system.trim().is_empty() {
                Value::Null
            } else {
                json!(system)
            };

            let body = json!({
                "model": self.model,
                "max_tokens": 1024,
                "system": system_value,
                "messages": messages,
                "tools": [
                    {
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters
                    }
                ],
                "tool_choice": {"type": "tool", "name": tool.name}
            });

            let response = reqwest::Client::new()
                .post(&url)
                .header("x-api-key", &self.key)
                .header("anthropic-version", "2023-06-01")
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach Claude")?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!(
                    "Claude API error ({}): {}",
                    status,
                    extract_api_error(&text).unwrap_or(text)
                ));
            }
            claude_tool_args(&text, &tool_name)
        })
    }
}

fn claude_tool_args(text: &str, tool_name: &str) -> Result<Value> {
    #[derive(Deserialize)]
    struct Response {
        content: Vec<Block>,
    }
    #[derive(Deserialize)]
    struct Block {
        #[serde(rename = "type")]
        kind: String,
        name: Option<String>,
        input: Option<Value>,
    }

    let payload: Response =
        serde_json::from_str(text).with_context(|| "failed to parse Claude response JSON")?;
    for block in &payload.content {
        if block.kind == "tool_use" && block.name.as_deref() == Some(tool_name) {
            return block
                .input
                .clone()
                .ok_or_else(|| anyhow!("Claude tool_use missing input"));
        }
    }
    Err(anyhow!("no tool call returned from Claude"))
}

/// Best-effort `{error: {message, type|status, code}}` extraction; all three
/// APIs use a close-enough shape for this to read.
fn extract_api_error(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let mut parts = Vec::new();
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        if !message.trim().is_empty() {
            parts.push(message.to_string());
        }
    }
    if let Some(kind) = error
        .get("type")
        .or_else(|| error.get("status"))
        .and_then(Value::as_str)
    {
        if !kind.trim().is_empty() {
            parts.push(format!("type: {}", kind));
        }
    }
    if let Some(code) = error.get("code") {
        match code {
            Value::String(code) if !code.trim().is_empty() => {
                parts.push(format!("code: {}", code));
            }
            Value::Number(code) => parts.push(format!("code: {}", code)),
            _ => {}
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    OpenAI(OpenAI),
    Gemini(Gemini),
    Claude(Claude),
}

impl Provider for ProviderImpl {
    fn append_system_input(self, input: String) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => {
                ProviderImpl::OpenAI(provider.append_system_input(input))
            }
            ProviderImpl::Gemini(provider) => {
                ProviderImpl::Gemini(provider.append_system_input(input))
            }
            ProviderImpl::Claude(provider) => {
                ProviderImpl::Claude(provider.append_system_input(input))
            }
        }
    }

    fn append_user_input(self, input: String) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => {
                ProviderImpl::OpenAI(provider.append_user_input(input))
            }
            ProviderImpl::Gemini(provider) => {
                ProviderImpl::Gemini(provider.append_user_input(input))
            }
            ProviderImpl::Claude(provider) => {
                ProviderImpl::Claude(provider.append_user_input(input))
            }
        }
    }

    fn register_tool(self, tool: ToolSpec) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => ProviderImpl::OpenAI(provider.register_tool(tool)),
            ProviderImpl::Gemini(provider) => ProviderImpl::Gemini(provider.register_tool(tool)),
            ProviderImpl::Claude(provider) => ProviderImpl::Claude(provider.register_tool(tool)),
        }
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        match self {
            ProviderImpl::OpenAI(provider) => provider.call_tool(tool_name),
            ProviderImpl::Gemini(provider) => provider.call_tool(tool_name),
            ProviderImpl::Claude(provider) => provider.call_tool(tool_name),
        }
    }
}

pub fn build_provider(provider: ProviderKind, key: String, model: String) -> ProviderImpl {
    match provider {
        ProviderKind::OpenAI => ProviderImpl::OpenAI(OpenAI::new(key, model)),
        ProviderKind::Gemini => ProviderImpl::Gemini(Gemini::new(key, model)),
        ProviderKind::Claude => ProviderImpl::Claude(Claude::new(key, model)),
    }
}

/// `provider` or `provider:model` argument wins; otherwise the first provider
/// with an API key in the environment; otherwise OpenAI when an explicit key
/// override was given.
pub fn resolve_provider_selection(
    model_arg: Option<&str>,
    override_key: Option<&str>,
) -> Result<ProviderSelection> {
    if let Some(raw) = model_arg {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(anyhow!("model argument is empty"));
        }
        if let Some(provider) = provider_from_name(&raw.to_lowercase()) {
            return Ok(ProviderSelection {
                provider,
                requested_model: None,
            });
        }
        if let Some((name, model)) = raw.split_once(':') {
            if let Some(provider) = provider_from_name(&name.to_lowercase()) {
                let model = model.trim();
                return Ok(ProviderSelection {
                    provider,
                    requested_model: (!model.is_empty()).then(|| model.to_string()),
                });
            }
        }
        return Err(anyhow!(
            "unable to infer provider from '{}'. Use provider:model (openai:, gemini:, claude:)",
            raw
        ));
    }

    for provider in [ProviderKind::OpenAI, ProviderKind::Gemini, ProviderKind::Claude] {
        if env_key(provider).is_some() {
            return Ok(ProviderSelection {
                provider,
                requested_model: None,
            });
        }
    }
    if override_key.is_some() {
        return Ok(ProviderSelection {
            provider: ProviderKind::OpenAI,
            requested_model: None,
        });
    }
    Err(anyhow!(
        "no API keys found (checked OPENAI_API_KEY, GEMINI_API_KEY/GOOGLE_API_KEY, ANTHROPIC_API_KEY)"
    ))
}

pub fn resolve_key(provider: ProviderKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key {
        return Ok(key.to_string());
    }
    env_key(provider).ok_or_else(|| anyhow!("API key not found for {}", provider.as_str()))
}

fn env_key(provider: ProviderKind) -> Option<String> {
    match provider {
        ProviderKind::OpenAI => get_env("OPENAI_API_KEY"),
        ProviderKind::Gemini => get_env("GEMINI_API_KEY").or_else(|| get_env("GOOGLE_API_KEY")),
        ProviderKind::Claude => get_env("ANTHROPIC_API_KEY"),
    }
}

fn provider_from_name(name: &str) -> Option<ProviderKind> {
    match name {
        "openai" => Some(ProviderKind::OpenAI),
        "gemini" | "google" => Some(ProviderKind::Gemini),
        "claude" | "anthropic" => Some(ProviderKind::Claude),
        _ => None,
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
