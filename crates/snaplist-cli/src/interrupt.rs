// Stopping work from the terminal.
//
// Ctrl+C is owned by one listener for the whole run: it cancels the
// in-flight exchange when there is one and asks the REPL to quit otherwise.
// While an exchange runs, stdin stays live so `/cancel` can be typed.

use std::future::Future;
use std::sync::Arc;

use snaplist_app::Assistant;
use snaplist_core::WorkflowError;
use tokio::io::{AsyncBufRead, Lines};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::command::Command;

/// Install the Ctrl+C listener. `quit` is notified on an idle interrupt.
pub fn spawn_interrupt_listener(assistant: Arc<Assistant>, quit: Arc<Notify>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("cannot listen for Ctrl+C: {e}");
                return;
            }
            if assistant.cancel() {
                println!("\nCancelling...");
            } else {
                info!("interrupted while idle");
                quit.notify_one();
            }
        }
    })
}

/// Await a workflow call while still reading input, so `/cancel` typed
/// mid-request aborts it. Other input is refused until the call ends.
pub async fn interruptible<T, R>(
    assistant: &Assistant,
    lines: &mut Lines<R>,
    call: impl Future<Output = Result<T, WorkflowError>>,
) -> Result<T, WorkflowError>
where
    R: AsyncBufRead + Unpin,
{
    tokio::pin!(call);
    let mut input_open = true;
    loop {
        // The call is polled first so it has started before any line is read.
        tokio::select! {
            biased;
            result = &mut call => return result,
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => match Command::parse(&line) {
                    Ok(Command::Cancel) => {
                        assistant.cancel();
                    }
                    Ok(Command::Empty) => {}
                    _ => println!("Still working; type /cancel or press Ctrl+C to stop."),
                },
                Ok(None) => input_open = false,
                Err(e) => {
                    warn!("stdin read failed during request: {e}");
                    input_open = false;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use snaplist_app::SessionSettings;
    use snaplist_core::completion::{CompletionRequest, CompletionService};
    use snaplist_core::CompletionError;
    use tokio::io::{AsyncBufReadExt, BufReader};

    struct Silent;

    #[async_trait]
    impl CompletionService for Silent {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            std::future::pending::<()>().await;
            Err(CompletionError::EmptyResponse)
        }
    }

    struct Immediate;

    #[async_trait]
    impl CompletionService for Immediate {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            Ok("Done.".into())
        }
    }

    #[tokio::test]
    async fn typed_cancel_aborts_the_running_request() {
        let assistant = Assistant::new(Arc::new(Silent), SessionSettings::default());
        let mut lines = BufReader::new(&b"what now?\n/cancel\n"[..]).lines();

        let err = interruptible(&assistant, &mut lines, assistant.send_message("hi"))
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::Cancelled);
        assert!(!assistant.is_busy());
        assert!(assistant.transcript().is_empty());
    }

    #[tokio::test]
    async fn closed_input_lets_the_request_finish() {
        let assistant = Assistant::new(Arc::new(Immediate), SessionSettings::default());
        let mut lines = BufReader::new(&b""[..]).lines();

        let reply = interruptible(&assistant, &mut lines, assistant.send_message("hi"))
            .await
            .unwrap();
        assert_eq!(reply.message(), "Done.");
    }
}
