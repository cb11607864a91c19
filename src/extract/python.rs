use super::{Frame, Traceback, TracebackRecognizer};
use fancy_regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

const MARKER: &str = "Traceback (most recent call last):";

static FRAME_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"File "([^"]+)", line (\d+)(?:, in (\S+))?"#).unwrap()
});

// Final raised-exception line: `<Identifier>: <free text>`, not indented.
static RAISE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*):\s?(.*)$").unwrap()
});

/// Recognizes CPython interpreter tracebacks.
pub struct PythonTraceback;

impl TracebackRecognizer for PythonTraceback {
    fn name(&self) -> &'static str {
        "python"
    }

    fn matches(&self, message: &str) -> bool {
        message.contains(MARKER)
    }

    fn recognize(&self, message: &str) -> Option<Traceback> {
        let block = &message[message.find(MARKER)?..];

        let mut frames = Vec::new();
        let mut raised: Option<(String, String)> = None;

        for line in block.lines().skip(1) {
            if let Some(caps) = FRAME_LINE.captures(line).ok().flatten() {
                frames.push(Frame {
                    file: PathBuf::from(&caps[1]),
                    line: caps[2].parse().ok()?,
                    function: caps.get(3).map(|m| m.as_str().to_string()),
                });
                continue;
            }

            // The raised-exception line is the last unindented `Type: text`
            // line after the frames; chained tracebacks overwrite earlier
            // candidates so the final exception wins.
            if !line.starts_with(' ') && !line.starts_with('\t') {
                if let Some(caps) = RAISE_LINE.captures(line).ok().flatten() {
                    raised = Some((caps[1].to_string(), caps[2].trim().to_string()));
                }
            }
        }

        if frames.is_empty() {
            return None;
        }
        let (error_type, error_message) = raised?;

        Some(Traceback {
            error_type,
            error_message,
            frames,
        })
    }
}
