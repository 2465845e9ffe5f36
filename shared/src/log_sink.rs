/// Bounded log buffer mirrored to a live surface.
///
/// `LogSink` is the writer handed to `tracing_subscriber`, so every log
/// event lands here instead of on a process-wide stdout. Each accepted write
/// re-renders the whole buffer to the configured [`LogSurface`].
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Something that displays the rendered log text.
///
/// Implementations must not log through `tracing`: they run inside the sink.
pub trait LogSurface: Send + Sync {
    fn render(&self, text: &str);
}

impl<F> LogSurface for F
where
    F: Fn(&str) + Send + Sync,
{
    fn render(&self, text: &str) {
        self(text)
    }
}

/// Discards renders.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSurface;

impl LogSurface for NullSurface {
    fn render(&self, _text: &str) {}
}

/// Rewrites a file with the full log on every render. Errors are ignored.
#[derive(Debug, Clone)]
pub struct FileSurface {
    path: PathBuf,
}

impl FileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogSurface for FileSurface {
    fn render(&self, text: &str) {
        let _ = std::fs::write(&self.path, text);
    }
}

/// Renders to several surfaces in order.
#[derive(Default)]
pub struct FanoutSurface {
    surfaces: Vec<Box<dyn LogSurface>>,
}

impl FanoutSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, surface: impl LogSurface + 'static) -> Self {
        self.surfaces.push(Box::new(surface));
        self
    }
}

impl LogSurface for FanoutSurface {
    fn render(&self, text: &str) {
        for surface in &self.surfaces {
            surface.render(text);
        }
    }
}

/// Fixed-capacity line buffer; the oldest line is evicted first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// All lines joined with `\n`.
    pub fn render(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }
}

struct SinkState {
    buffer: LogBuffer,
    surface: Box<dyn LogSurface>,
    mirror_stderr: bool,
}

/// Shared handle to the log buffer and its surface. Cloning is cheap.
#[derive(Clone)]
pub struct LogSink {
    state: Arc<Mutex<SinkState>>,
}

impl LogSink {
    pub fn new(capacity: usize, surface: impl LogSurface + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState {
                buffer: LogBuffer::new(capacity),
                surface: Box::new(surface),
                mirror_stderr: false,
            })),
        }
    }

    /// Also echo every accepted line to stderr.
    pub fn mirror_stderr(self, enabled: bool) -> Self {
        self.lock().mirror_stderr = enabled;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one message. Whitespace-only messages are dropped.
    ///
    /// Returns whether the message was kept.
    pub fn append(&self, msg: &str) -> bool {
        if msg.trim().is_empty() {
            return false;
        }

        let line = msg.trim_end();
        let mut state = self.lock();
        if state.mirror_stderr {
            mirror_line(std::io::stderr(), line);
        }
        state.buffer.push(line);
        let text = state.buffer.render();
        state.surface.render(&text);
        true
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().buffer.lines().map(String::from).collect()
    }

    pub fn rendered(&self) -> String {
        self.lock().buffer.render()
    }

    pub fn capacity(&self) -> usize {
        self.lock().buffer.capacity()
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }
}

/// Echo a line to a secondary stream. A closed or broken stream is ignored.
fn mirror_line(mut out: impl Write, line: &str) {
    let _ = writeln!(out, "{}", line);
}

impl Write for LogSink {
    /// Accepts the whole buffer, kept or not.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.append(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
