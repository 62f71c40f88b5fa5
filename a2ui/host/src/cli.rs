//! One-shot commands that work on a file of server messages.

use a2ui_runtime::{Catalog, MessageProcessor, RuntimeConfig, ServerMessage, validate_messages};
use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Accepts a single JSON document (one message or an array) or JSON lines,
/// one message per line.
pub fn parse_messages(text: &str) -> Result<Value> {
    if let Ok(document) = serde_json::from_str::<Value>(text) {
        return Ok(document);
    }

    let mut messages = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: Value = serde_json::from_str(line)
            .with_context(|| format!("line {} is not valid JSON", line_no + 1))?;
        messages.push(message);
    }
    if messages.is_empty() {
        bail!("no messages found");
    }
    Ok(Value::Array(messages))
}

pub fn read_messages(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_messages(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Prints validator errors to stdout. Returns `true` when the file is clean.
pub fn run_validate(path: &Path) -> Result<bool> {
    let messages = read_messages(path)?;
    let errors = validate_messages(&messages);

    if errors.is_empty() {
        println!("{}: ok", path.display());
        return Ok(true);
    }
    for error in &errors {
        println!("{error}");
    }
    warn!(count = errors.len(), file = %path.display(), "validation failed");
    Ok(false)
}

/// Applies the file to a fresh processor and returns one snapshot per live
/// surface, or only `surface` when given, plus the per-message errors.
pub fn apply_messages(
    messages: Value,
    surface: Option<&str>,
    runtime: RuntimeConfig,
) -> (Vec<Value>, Vec<String>) {
    let mut processor = MessageProcessor::new(Catalog::with_extensions(), runtime);
    let raw = match messages {
        Value::Array(items) => items,
        single => vec![single],
    };

    let mut errors = Vec::new();
    let mut decoded = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        match ServerMessage::from_value(value) {
            Ok(message) => decoded.push(message),
            Err(err) => errors.push(format!("[Message {index}] {err}")),
        }
    }
    debug!(count = decoded.len(), "applying messages");
    errors.extend(
        processor
            .process_messages(decoded)
            .into_iter()
            .map(|err| err.to_string()),
    );

    let snapshots = match surface {
        Some(id) => processor.snapshot(id).into_iter().collect(),
        None => processor
            .surfaces()
            .filter_map(|live| processor.snapshot(live.id()))
            .collect(),
    };
    (snapshots, errors)
}

pub fn run_apply(path: &Path, surface: Option<&str>, runtime: RuntimeConfig) -> Result<()> {
    let messages = read_messages(path)?;
    let (snapshots, errors) = apply_messages(messages, surface, runtime);

    for error in &errors {
        eprintln!("{error}");
    }
    if let (Some(id), true) = (surface, snapshots.is_empty()) {
        bail!("surface '{id}' does not exist after applying {}", path.display());
    }

    let rendered = serde_json::to_string_pretty(&snapshots).context("failed to encode snapshots")?;
    println!("{rendered}");
    Ok(())
}
