//! Printing message sequences.

use std::io::Write;

use anyhow::Result;
use miniagents_core::{Message, MessageSequencePromise};

/// Print each message of `sequence` token by token as it arrives, one
/// message per line, and return the resolved messages.
pub async fn stream_text(sequence: &MessageSequencePromise) -> Result<Vec<Message>> {
    let mut stdout = std::io::stdout();
    let mut messages = Vec::new();
    let mut promises = sequence.iter();
    while let Some(promise) = promises.next().await {
        let promise = promise?;
        let mut tokens = promise.tokens();
        while let Some(token) = tokens.next().await {
            write!(stdout, "{}", token?)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
        messages.push(promise.message().await?);
    }
    Ok(messages)
}

/// Print `sequence`: live tokens in text mode, a JSON array once resolved otherwise.
pub async fn print_sequence(sequence: &MessageSequencePromise, json: bool) -> Result<Vec<Message>> {
    if json {
        let messages = sequence.messages().await?;
        println!("{}", serde_json::to_string_pretty(&messages)?);
        Ok(messages)
    } else {
        stream_text(sequence).await
    }
}

/// `speaker: text` lines, or a JSON array of `{speaker, message}` objects.
pub fn render_transcript(entries: &[(String, Message)], json: bool) -> Result<String> {
    if json {
        let value: Vec<_> = entries
            .iter()
            .map(|(speaker, message)| serde_json::json!({ "speaker": speaker, "message": message }))
            .collect();
        return Ok(serde_json::to_string_pretty(&value)?);
    }
    Ok(entries
        .iter()
        .map(|(speaker, message)| format!("{speaker}: {message}"))
        .collect::<Vec<_>>()
        .join("\n"))
}
