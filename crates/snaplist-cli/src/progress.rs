// Token progress display.
//
// Each request streams under its own generation. Once a newer generation
// shows up, leftovers from older requests still queued in the channel are
// dropped instead of printed.

use snaplist_llm::LlmEvent;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
pub struct Progress {
    latest: u64,
}

impl Progress {
    /// Text to print for `event`, or `None` when it belongs to a request
    /// older than the newest one seen.
    pub fn render(&mut self, event: &LlmEvent) -> Option<&'static str> {
        let generation = event.generation();
        if generation < self.latest {
            return None;
        }
        self.latest = generation;
        Some(match event {
            LlmEvent::Token { .. } => ".",
            LlmEvent::Complete { .. } | LlmEvent::Error { .. } => "\n",
        })
    }
}

/// Print a dot per streamed token so long requests show signs of life.
pub async fn show_progress(mut rx: mpsc::Receiver<LlmEvent>) {
    let mut progress = Progress::default();
    let mut stdout = tokio::io::stdout();
    while let Some(event) = rx.recv().await {
        let Some(out) = progress.render(&event) else {
            continue;
        };
        let _ = stdout.write_all(out.as_bytes()).await;
        let _ = stdout.flush().await;
    }
}
