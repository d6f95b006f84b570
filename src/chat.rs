//! Interactive chat loop for Grace.
//!
//! A REPL over the session store: plain lines are sent to the model,
//! `:commands` drive session management. Every state change goes through
//! `SessionStore`, which mirrors itself to disk after each mutation.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::providers::gemini::{GeminiClient, GeminiConfig};
use crate::session::{self, Message};
use crate::store::SessionStore;

const QUIT_COMMAND: &str = ":q";
const PROMPT_PREFIX: &str = "you> ";
const REPLY_PREFIX: &str = "grace> ";

const HELP_TEXT: &str = "\
Commands:
  :new              start a new chat session
  :sessions         list sessions (* marks the active one)
  :switch <id>      switch to another session
  :rename <title>   rename the active session
  :delete [id]      delete a session (default: active)
  :retry            resend the last failed message
  :export [id]      write a session to <id>.json (default: active)
  :help             show this help
  :q                quit";

/// Runs the chat loop.
///
/// Reads user input from `input`, writes output to `output`.
/// Exits on `:q` command or EOF.
pub async fn run_chat<R, W>(
    input: R,
    output: &mut W,
    client: &GeminiClient,
    store: &mut SessionStore,
    system_prompt: &str,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed == QUIT_COMMAND {
            writeln!(output, "Goodbye!")?;
            break;
        }

        // Blank input is a no-op: nothing is appended, nothing is sent.
        if trimmed.is_empty() {
            prompt(output)?;
            continue;
        }

        if trimmed.starts_with(':') {
            handle_command(trimmed, output, client, store, system_prompt).await?;
            prompt(output)?;
            continue;
        }

        match store.begin_send(trimmed) {
            Some(history) => {
                resolve_request(output, client, store, &history, system_prompt).await?;
            }
            None => {
                // A request is already in flight for this session.
                writeln!(output, "Still waiting for a reply; try again afterwards.")?;
            }
        }
        prompt(output)?;
    }

    Ok(())
}

/// Awaits the completion request and resolves it against the store.
///
/// On failure the error flag is set and the typing flag cleared, so the
/// message can be re-sent with `:retry`; the loop keeps running either way.
async fn resolve_request<W: Write>(
    output: &mut W,
    client: &GeminiClient,
    store: &mut SessionStore,
    history: &[Message],
    system_prompt: &str,
) -> Result<()> {
    match client.generate(history, Some(system_prompt)).await {
        Ok(text) => {
            store.complete_reply(&text);
            writeln!(output, "{}{}", REPLY_PREFIX, text)?;
        }
        Err(e) => {
            store.fail_reply();
            writeln!(output, "Error: {:#}", e)?;
            writeln!(output, "Type :retry to resend the last message.")?;
        }
    }
    Ok(())
}

async fn handle_command<W: Write>(
    command: &str,
    output: &mut W,
    client: &GeminiClient,
    store: &mut SessionStore,
    system_prompt: &str,
) -> Result<()> {
    let (name, rest) = match command[1..].split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (&command[1..], ""),
    };

    match name {
        "help" => {
            writeln!(output, "{}", HELP_TEXT)?;
        }
        "new" => {
            store.new_session();
            writeln!(output, "Started {}", store.current().title)?;
        }
        "sessions" => {
            for session in store.sorted_sessions() {
                let marker = if session.id == store.current_id() {
                    '*'
                } else {
                    ' '
                };
                writeln!(
                    output,
                    "{} {}  {}  {} ({} messages)",
                    marker,
                    session.id,
                    session.created_at,
                    session.title,
                    session.messages.len()
                )?;
            }
        }
        "switch" => {
            if rest.is_empty() {
                writeln!(output, "Usage: :switch <id>")?;
            } else if store.switch_session(rest) {
                writeln!(output, "Switched to {}", store.current().title)?;
            } else {
                writeln!(output, "No session '{}'", rest)?;
            }
        }
        "rename" => {
            let id = store.current_id().to_string();
            if store.rename_session(&id, rest) {
                writeln!(output, "Renamed to {}", store.current().title)?;
            } else {
                writeln!(output, "Title unchanged.")?;
            }
        }
        "delete" => {
            let id = if rest.is_empty() {
                store.current_id().to_string()
            } else {
                rest.to_string()
            };
            if store.delete_session(&id) {
                writeln!(output, "Deleted session {}", id)?;
                writeln!(output, "Now on {}", store.current().title)?;
            } else {
                writeln!(output, "No session '{}'", id)?;
            }
        }
        "retry" => match store.begin_retry() {
            Some(history) => {
                resolve_request(output, client, store, &history, system_prompt).await?;
            }
            None => {
                writeln!(output, "Nothing to retry.")?;
            }
        },
        "export" => {
            let id = if rest.is_empty() {
                store.current_id().to_string()
            } else {
                rest.to_string()
            };
            match store.export_session(&id) {
                Some(export) => {
                    let dir = std::env::current_dir().context("resolve current directory")?;
                    let path = session::write_export(&export, &dir)?;
                    writeln!(output, "Exported to {}", path.display())?;
                }
                None => {
                    writeln!(output, "No session '{}'", id)?;
                }
            }
        }
        other => {
            writeln!(output, "Unknown command ':{}'. Type :help.", other)?;
        }
    }

    Ok(())
}

fn prompt<W: Write>(output: &mut W) -> Result<()> {
    write!(output, "{}", PROMPT_PREFIX)?;
    output.flush()?;
    Ok(())
}

/// Runs the chat loop with stdin/stdout.
pub async fn run_interactive_chat(config: &Config) -> Result<()> {
    let gemini_config = GeminiConfig::from_env(
        config.model.clone(),
        config.max_output_tokens,
        config.effective_gemini_base_url(),
    )?;
    let client = GeminiClient::new(gemini_config);
    let system_prompt = config.effective_system_prompt()?;
    let mut store = SessionStore::open();

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    writeln!(stdout, "Grace Chat (type :q to quit, :help for commands)")?;
    writeln!(stdout, "Session: {}", store.current().title)?;
    let message_count = store.current().messages.len();
    if message_count > 0 {
        writeln!(stdout, "Loaded {} previous messages", message_count)?;
    }
    prompt(&mut stdout)?;

    run_chat(
        stdin.lock(),
        &mut stdout,
        &client,
        &mut store,
        &system_prompt,
    )
    .await
}
