use tracing::{info, warn};

/// Append-only message log for one scan run.
///
/// Owned by the pipeline call and returned with the output; the caller
/// decides where it is flushed. Messages are mirrored to `tracing` so a
/// subscriber sees them live.
#[derive(Debug, Default)]
pub struct RunLog {
    entries: Vec<String>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        info!("{}", msg);
        self.entries.push(msg);
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{}", msg);
        self.entries.push(format!("Warning: {}", msg));
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn to_text(&self) -> String {
        let mut text = self.entries.join("\n");
        text.push('\n');
        text
    }
}
