use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde_json::Value;
use theme_core::ThemeError;

type Sink = Box<dyn Write + Send>;

/// Collects diagnostics so they do not interleave with progress output.
///
/// In immediate mode every report is written straight away; in delayed mode reports are
/// buffered until [`ErrorReporter::flush`].
pub struct ErrorReporter {
    state: Mutex<ReporterState>,
}

struct ReporterState {
    delayed: bool,
    buffered: Vec<String>,
    reported: usize,
    sink: Sink,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::with_sink(Box::new(io::stderr()))
    }

    pub fn with_sink(sink: Sink) -> Self {
        Self {
            state: Mutex::new(ReporterState {
                delayed: false,
                buffered: Vec::new(),
                reported: 0,
                sink,
            }),
        }
    }

    pub fn set_delayed(&self, delayed: bool) {
        self.lock().delayed = delayed;
    }

    pub fn is_delayed(&self) -> bool {
        self.lock().delayed
    }

    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        let mut state = self.lock();
        state.reported += 1;
        if state.delayed {
            state.buffered.push(message);
        } else {
            let _ = writeln!(state.sink, "{message}");
        }
    }

    /// Writes every buffered report and clears the buffer.
    pub fn flush(&self) {
        let mut state = self.lock();
        let buffered = std::mem::take(&mut state.buffered);
        for message in buffered {
            let _ = writeln!(state.sink, "{message}");
        }
        let _ = state.sink.flush();
    }

    pub fn has_any_error(&self) -> bool {
        self.lock().reported > 0
    }

    pub fn error_count(&self) -> usize {
        self.lock().reported
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    errors: Value,
}

/// Compact console text for an API error: the first line of every message found under
/// `errors`, or the error's own text when the body does not have that shape.
pub fn format_api_error(err: &ThemeError) -> String {
    let ThemeError::Api { body, .. } = err else {
        return err.to_string();
    };
    let messages = serde_json::from_str::<ApiErrorBody>(body)
        .map(|parsed| collect_messages(&parsed.errors))
        .unwrap_or_default();
    if messages.is_empty() {
        err.to_string()
    } else {
        messages.join("\n")
    }
}

fn collect_messages(errors: &Value) -> Vec<String> {
    match errors {
        Value::String(message) => vec![first_line(message)],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(first_line)
            .collect(),
        Value::Object(fields) => fields.values().flat_map(collect_messages).collect(),
        _ => Vec::new(),
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}

/// In-memory sink, handy for capturing output.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
