//! Operator stop signal for the capture loop.
//!
//! The loop polls the flag once per frame. Typing `q` + Enter on stdin or
//! pressing Ctrl-C sets it; nothing else can.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Hook up Ctrl-C and a stdin watcher thread.
    ///
    /// The watcher only flips the flag. When stdin closes it exits quietly
    /// and Ctrl-C remains the way out.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let on_interrupt = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("interrupt received; stopping");
            on_interrupt.request();
        })?;

        let on_key = self.clone();
        let spawned = std::thread::Builder::new()
            .name("rollcall-stop-key".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if is_stop_key(&line) {
                        tracing::info!("stop key pressed; stopping");
                        on_key.request();
                        break;
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not watch stdin for the stop key; use Ctrl-C");
        }
        Ok(())
    }
}

fn is_stop_key(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("q")
}
