//! Chat loop: forwards user lines to the model and lets the model call
//! remote tools through a [`ToolProvider`].
//!
//! Each user line triggers at most `max_steps` model calls. Tool calls
//! requested by the model are executed and their results fed back until the
//! model answers in plain text or the step budget runs out. Only the user's
//! line and the final answer are kept in the history.

use crate::error::Result;
use crate::llm::{ContentBlock, ConversationMessage, Role, TextGenerator, ToolDef, Usage};
use crate::mcp::client::ToolProvider;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Append-only record of the conversation for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            text: text.into(),
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            text: text.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn to_messages(&self) -> Vec<ConversationMessage> {
        self.turns
            .iter()
            .map(|t| ConversationMessage::text(t.role, t.text.clone()))
            .collect()
    }
}

/// Outcome of one [`generate_text`] run.
#[derive(Debug, Default)]
pub struct Generation {
    pub text: String,
    pub steps: u32,
    pub tool_calls: u32,
    pub usage: Usage,
}

/// Run the model over `history`, executing requested tools, for at most
/// `max_steps` model calls.
pub async fn generate_text<G, P>(
    generator: &G,
    provider: &P,
    system: &str,
    history: &ChatHistory,
    tools: &[ToolDef],
    max_steps: u32,
) -> Result<Generation>
where
    G: TextGenerator,
    P: ToolProvider,
{
    let mut messages = history.to_messages();
    let mut generation = Generation::default();

    while generation.steps < max_steps.max(1) {
        let response = generator.converse(system, &messages, tools).await?;
        generation.steps += 1;
        generation.usage.input_tokens += response.usage.input_tokens;
        generation.usage.output_tokens += response.usage.output_tokens;
        generation.text = response.text();

        let tool_uses = response.tool_uses();
        debug!(
            step = generation.steps,
            stop = ?response.stop_reason,
            tool_uses = tool_uses.len(),
            "model step"
        );

        messages.push(ConversationMessage {
            role: Role::Assistant,
            content: response.content,
        });

        if tool_uses.is_empty() {
            break;
        }

        let mut results = Vec::with_capacity(tool_uses.len());
        for (id, name, input) in tool_uses {
            generation.tool_calls += 1;
            info!(tool = %name, "calling tool");
            let (content, is_error) = match provider.call_tool(&name, input).await {
                Ok(output) => (output.to_model_text(), output.is_error),
                Err(e) => {
                    warn!(tool = %name, error = %e, "tool call failed");
                    (format!("Tool call failed: {e}"), true)
                }
            };
            results.push(ContentBlock::ToolResult {
                tool_use_id: id,
                content,
                is_error,
            });
        }
        messages.push(ConversationMessage {
            role: Role::User,
            content: results,
        });
    }

    Ok(generation)
}

pub struct ChatSession<G, P> {
    generator: G,
    provider: P,
    history: ChatHistory,
    system_prompt: String,
    max_steps: u32,
}

impl<G: TextGenerator, P: ToolProvider> ChatSession<G, P> {
    pub fn new(generator: G, provider: P, system_prompt: String, max_steps: u32) -> Self {
        Self {
            generator,
            provider,
            history: ChatHistory::default(),
            system_prompt,
            max_steps,
        }
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Give back the tool provider, e.g. to close its connection.
    pub fn into_provider(self) -> P {
        self.provider
    }

    /// Handle one user line and return the model's final text.
    pub async fn respond(&mut self, line: &str) -> Result<String> {
        self.history.push_user(line);
        let tools = self.provider.list_tools().await?;
        let generation = generate_text(
            &self.generator,
            &self.provider,
            &self.system_prompt,
            &self.history,
            &tools,
            self.max_steps,
        )
        .await?;

        debug!(
            steps = generation.steps,
            tool_calls = generation.tool_calls,
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            "exchange complete"
        );
        self.history.push_assistant(generation.text.clone());
        Ok(generation.text)
    }

    /// Prompt with `You: `, answer with `AI: ...`, until EOF or `exit`.
    pub async fn run<R, W>(&mut self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        loop {
            output.write_all(b"You: ").await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "exit" {
                break;
            }

            match self.respond(line).await {
                Ok(text) => {
                    output.write_all(format!("AI: {text}\n").as_bytes()).await?;
                }
                Err(e) => error!("chat exchange failed: {e}"),
            }
        }
        output.write_all(b"\n").await?;
        output.flush().await?;
        Ok(())
    }
}
