//! Append-only notes files inside the agent data directory.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use regex::Regex;
use serde_json::{json, Value};

use super::{Tool, ToolError, ToolKind};

/// Timestamp prefix written before every appended line.
const STAMP_FORMAT: &str = "[%d.%m.%Y %H:%M] ";

/// Arguments recovered from the model's `Action Input`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendArgs {
    pub filepath: String,
    pub content: String,
}

/// Append a line of text to a file in the data directory.
pub struct AppendToFile {
    data_dir: PathBuf,
}

impl AppendToFile {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for AppendToFile {
    fn kind(&self) -> ToolKind {
        ToolKind::AppendToFile
    }

    fn description(&self) -> &str {
        "Append text content to a file inside the agent data directory. filepath is a plain file name such as \"notes.txt\"; content is the text to write. Do not nest JSON inside JSON."
    }

    fn input_example(&self) -> Value {
        json!({ "filepath": "file name", "content": "text to write" })
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let args = parse_append_args(input)?;
        let file_name = sanitize_file_name(&args.filepath)?;
        let content = args.content.trim();
        if content.is_empty() {
            return Err(ToolError::InvalidArgument("content must not be empty".to_string()));
        }

        let path = self.data_dir.join(&file_name);
        let line = format!(
            "{}{}\n",
            chrono::Local::now().format(STAMP_FORMAT),
            content.trim_end()
        );

        let dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || append_line(&dir, &path, &line))
            .await
            .map_err(|e| ToolError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        tracing::info!(file = %file_name, bytes = content.len(), "appended to notes file");
        Ok(format!("Appended to {}", file_name))
    }
}

/// Open, lock, write one line, close. The lock never outlives this call.
fn append_line(dir: &Path, path: &Path, line: &str) -> Result<(), ToolError> {
    fs::create_dir_all(dir)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
    let unlocked = FileExt::unlock(&file);
    written?;
    unlocked?;
    Ok(())
}

/// Reduce a caller-supplied path to its final component.
fn sanitize_file_name(filepath: &str) -> Result<String, ToolError> {
    let normalized = filepath.trim().replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ToolError::InvalidArgument(format!("filepath '{}' has no file name", filepath.trim()))
        })
}

/// Recover `filepath` and `content` from model output.
///
/// Well-formed JSON is taken as is. Anything else is matched on the literal
/// `filepath` and `content` labels, in that order, and the values between
/// them are trimmed of whitespace, a closing brace and surrounding quotes.
/// Only missing labels are an error here; empty values are left for the
/// caller to reject.
pub fn parse_append_args(input: &str) -> Result<AppendArgs, ToolError> {
    let trimmed = input.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        if let (Some(filepath), Some(content)) = (
            map.get("filepath").and_then(Value::as_str),
            map.get("content").and_then(Value::as_str),
        ) {
            return Ok(AppendArgs {
                filepath: filepath.trim().to_string(),
                content: content.trim().to_string(),
            });
        }
    }

    let caps = append_markers().captures(trimmed).ok_or_else(|| {
        ToolError::MalformedInput(
            "expected \"filepath\" followed by \"content\" in the action input".to_string(),
        )
    })?;

    let filepath = clean_value(&caps[1]);
    let mut content = caps[2].trim();
    if trimmed.starts_with('{') {
        content = content.strip_suffix('}').unwrap_or(content).trim_end();
    }

    Ok(AppendArgs {
        filepath,
        content: clean_value(content),
    })
}

fn clean_value(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').trim().to_string()
}

fn append_markers() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)["']?filepath["']?\s*:\s*(.*?)\s*,\s*["']?content["']?\s*:\s*(.*)"#)
            .expect("append marker pattern is valid")
    })
}
