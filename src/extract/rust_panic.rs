use super::{Frame, Traceback, TracebackRecognizer};
use fancy_regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

const MARKER: &str = "panicked at";

// Rust 1.65+: thread 'name' panicked at src/main.rs:5:10:
//             payload on the following line(s)
static LOCATION_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"thread '[^']*' panicked at (.+?):(\d+):(\d+):?\s*$").unwrap()
});

// Older toolchains: thread 'name' panicked at 'payload', src/main.rs:5:10
static PAYLOAD_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"thread '[^']*' panicked at '(.*)', (.+?):(\d+):(\d+)").unwrap()
});

/// Recognizes Rust panic messages in either location-first (1.65+) or
/// payload-first layout.
///
/// Only the panic location itself becomes a frame. Backtrace frames are
/// deliberately not collected: their innermost entries point into
/// `core::panicking`, which the deepest-frame blame policy would then pick
/// over the user code that actually panicked.
pub struct RustPanic;

impl TracebackRecognizer for RustPanic {
    fn name(&self) -> &'static str {
        "rust-panic"
    }

    fn matches(&self, message: &str) -> bool {
        message.contains(MARKER)
    }

    fn recognize(&self, message: &str) -> Option<Traceback> {
        for line in message.lines() {
            if let Some(caps) = PAYLOAD_FIRST.captures(line).ok().flatten() {
                return Some(Traceback {
                    error_type: "panic".to_string(),
                    error_message: caps[1].to_string(),
                    frames: vec![Frame {
                        file: PathBuf::from(&caps[2]),
                        line: caps[3].parse().ok()?,
                        function: None,
                    }],
                });
            }

            if let Some(caps) = LOCATION_FIRST.captures(line).ok().flatten() {
                // Payload follows on the next non-empty line, if any.
                let payload = message
                    .lines()
                    .skip_while(|l| *l != line)
                    .skip(1)
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("")
                    .trim()
                    .to_string();
                return Some(Traceback {
                    error_type: "panic".to_string(),
                    error_message: payload,
                    frames: vec![Frame {
                        file: PathBuf::from(&caps[1]),
                        line: caps[2].parse().ok()?,
                        function: None,
                    }],
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_first_layout() {
        let message = "\
worker crashed
thread 'main' panicked at src/queue.rs:88:13:
index out of bounds: the len is 3 but the index is 7
note: run with `RUST_BACKTRACE=1` to display a backtrace";
        let tb = RustPanic.recognize(message).unwrap();
        assert_eq!(tb.error_type, "panic");
        assert_eq!(
            tb.error_message,
            "index out of bounds: the len is 3 but the index is 7"
        );
        assert_eq!(tb.frames.len(), 1);
        assert_eq!(tb.frames[0].file, PathBuf::from("src/queue.rs"));
        assert_eq!(tb.frames[0].line, 88);
    }

    #[test]
    fn test_payload_first_layout() {
        let message =
            "thread 'worker-1' panicked at 'called `Option::unwrap()` on a `None` value', src/lib.rs:12:40";
        let tb = RustPanic.recognize(message).unwrap();
        assert_eq!(
            tb.error_message,
            "called `Option::unwrap()` on a `None` value"
        );
        assert_eq!(tb.frames[0].file, PathBuf::from("src/lib.rs"));
        assert_eq!(tb.frames[0].line, 12);
    }

    #[test]
    fn test_non_panic_is_rejected() {
        assert!(!RustPanic.matches("ERROR normal failure"));
        assert!(RustPanic.recognize("something panicked at dawn").is_none());
    }
}
