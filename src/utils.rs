use std::{borrow::Cow, path::PathBuf, sync::LazyLock};

use regex::Regex;

use tracing_subscriber::EnvFilter;

/// 获取当前时间，统一使用 UTC
pub fn now_utc() -> time::OffsetDateTime {
    time::OffsetDateTime::now_utc()
}

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    /// For commands whose stdout is their result
    Stderr,
    /// Daily rotated files in this directory
    Dir(PathBuf),
}

impl From<Option<PathBuf>> for LogOutput {
    fn from(dir: Option<PathBuf>) -> Self {
        dir.map_or(LogOutput::Stdout, LogOutput::Dir)
    }
}

/// 初始化日志
pub fn init_log(output: LogOutput) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber_builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true);
    let (non_blocking, guard) = match output {
        LogOutput::Dir(log) => {
            // output to file，daily rotate, non-blocking
            if !log.is_dir() {
                anyhow::bail!("log path {} is not a directory", log.display());
            }
            let file_appender = tracing_appender::rolling::daily(log, "learnova.log");
            tracing_appender::non_blocking(file_appender)
        }
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };
    tracing::subscriber::set_global_default(subscriber_builder.with_writer(non_blocking).finish())?;
    Ok(guard)
}

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence pattern is valid"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("comma pattern is valid"));

/// Models often wrap JSON answers in a markdown fence, sometimes after a line
/// of prose; return what is inside the first fence, or the trimmed text.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    if let Some(body) = FENCED.captures(trimmed).and_then(|c| c.get(1)) {
        return body.as_str();
    }
    // fence never closed, usually a cut-off answer
    let rest = &trimmed[start + 3..];
    rest.strip_prefix("json").unwrap_or(rest).trim()
}

/// Close the strings, arrays and objects a cut-off JSON text left open.
/// The flag tells whether anything had to be closed.
pub fn repair_truncated_json(text: &str) -> (String, bool) {
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
    }
    if open.is_empty() && !in_string {
        return (text.to_string(), false);
    }
    let mut repaired = text.to_string();
    if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    }
    repaired.extend(open.iter().rev());
    (repaired, true)
}

/// `[1, 2,]` and `{"a": 1,}` become valid JSON.
pub fn strip_trailing_commas(text: &str) -> Cow<'_, str> {
    TRAILING_COMMA.replace_all(text, "$1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_output_from_config() {
        assert_eq!(LogOutput::from(None), LogOutput::Stdout);
        let dir = PathBuf::from("/var/log/learnova");
        assert_eq!(LogOutput::from(Some(dir.clone())), LogOutput::Dir(dir));
    }

    #[test]
    fn log_dir_must_exist() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = init_log(LogOutput::Dir(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().ends_with("is not a directory"));
    }

    #[test]
    fn extract_json_variants() {
        assert_eq!(extract_json("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("  ```\n[1, 2]\n```  "), "[1, 2]");
        assert_eq!(extract_json("Here you go:\n```json\n[3]\n```\nEnjoy!"), "[3]");
        assert_eq!(extract_json("```json\n[{\"a\": 1}"), "[{\"a\": 1}");
    }

    #[test]
    fn complete_json_is_left_alone() {
        let text = r#"[{"q": "a [b] {c}", "n": 1}]"#;
        assert_eq!(repair_truncated_json(text), (text.to_string(), false));
    }

    #[test]
    fn truncated_json_is_closed_in_order() {
        let (repaired, truncated) = repair_truncated_json(r#"[{"q": "x", "o": ["a", "b"#);
        assert!(truncated);
        assert_eq!(repaired, r#"[{"q": "x", "o": ["a", "b"]}]"#);
        assert!(serde_json::from_str::<serde_json::Value>(&repaired).is_ok());
    }

    #[test]
    fn trailing_commas_are_dropped() {
        assert_eq!(strip_trailing_commas("[1, 2,]"), "[1, 2]");
        assert_eq!(strip_trailing_commas("{\"a\": [1,\n],\n}"), "{\"a\": [1]}");
        let (repaired, _) = repair_truncated_json("[{\"a\": 1},");
        assert_eq!(strip_trailing_commas(&repaired), "[{\"a\": 1}]");
    }
}
