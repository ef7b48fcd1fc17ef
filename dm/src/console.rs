//! Line input that gives way to Ctrl-C.
//!
//! One background task owns the Ctrl-C handler and flips a watch flag.
//! Every read and every long wait selects on that flag, so an interrupt at
//! any prompt or mid-turn ends the game through the normal save path.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines, Stdin};
use tokio::sync::watch;

pub struct Console<R = Stdin> {
    lines: Lines<BufReader<R>>,
    interrupt: watch::Receiver<bool>,
}

impl Console<Stdin> {
    /// Read from stdin, interrupted by Ctrl-C.
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin(), watch_ctrl_c())
    }
}

impl<R: AsyncRead + Unpin> Console<R> {
    pub fn new(reader: R, interrupt: watch::Receiver<bool>) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            interrupt,
        }
    }

    /// Whether Ctrl-C has been pressed.
    pub fn is_interrupted(&self) -> bool {
        *self.interrupt.borrow()
    }

    /// Resolves once Ctrl-C is pressed.
    pub async fn interrupted(&mut self) {
        wait_for_interrupt(&mut self.interrupt).await
    }

    /// The next input line, or `None` at end of input or after Ctrl-C.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        tokio::select! {
            biased;
            _ = wait_for_interrupt(&mut self.interrupt) => Ok(None),
            line = self.lines.next_line() => line,
        }
    }

    pub async fn ask(&mut self, question: &str) -> std::io::Result<Option<String>> {
        prompt(question);
        self.next_line().await
    }

    /// A yes/no question. Anything but "y" or "yes" is a no.
    pub async fn confirm(&mut self, question: &str) -> std::io::Result<bool> {
        let answer = self.ask(question).await?.unwrap_or_default();
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

/// Spawn the Ctrl-C forwarder. A second Ctrl-C exits without saving.
fn watch_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            log::warn!("Ctrl-C handler unavailable");
            return;
        }
        log::debug!("Interrupted, saving before exit");
        tx.send_replace(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    rx
}

async fn wait_for_interrupt(interrupt: &mut watch::Receiver<bool>) {
    if interrupt.wait_for(|&hit| hit).await.is_err() {
        // Forwarder gone: no interrupt will ever arrive.
        std::future::pending::<()>().await;
    }
}

pub fn prompt(text: &str) {
    print!("{text} ");
    std::io::stdout().flush().ok();
}
