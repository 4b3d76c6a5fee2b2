//! Background execution of an [`Assembly`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use super::{Assembly, BuildReport, BuildRequest, CancelToken, Events};
use crate::backend::Backend;
use crate::error::{Error, Result};

/// Messages from a background build.
#[derive(Debug)]
pub enum BuildEvent {
    /// Human-readable progress line.
    Log(String),
    /// Chapters processed so far.
    Progress(usize),
    /// The run ended. Always the last event.
    Finished(Result<BuildReport>),
}

/// Handle to a running build.
pub struct BuildHandle {
    events: Receiver<BuildEvent>,
    cancel: CancelToken,
    progress: Arc<AtomicUsize>,
    thread: Option<JoinHandle<()>>,
}

impl BuildHandle {
    /// Ask the build to stop before its next chapter.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Chapters processed so far, readable without touching the channel.
    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &Receiver<BuildEvent> {
        &self.events
    }

    /// Block until the build finishes, passing every other event to
    /// `on_event`.
    pub fn wait(mut self, mut on_event: impl FnMut(&BuildEvent)) -> Result<BuildReport> {
        let mut outcome = None;
        for event in self.events.iter() {
            match event {
                BuildEvent::Finished(result) => {
                    outcome = Some(result);
                    break;
                }
                other => on_event(&other),
            }
        }

        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            return Err(Error::Assembly("build thread panicked".to_string()));
        }

        outcome.unwrap_or_else(|| Err(Error::Assembly("build ended without a result".to_string())))
    }
}

/// Run `assembly` on a dedicated thread, writing the book into `dir`.
///
/// Any events already attached to the assembly are replaced by the channel.
pub fn spawn_build<B>(
    assembly: Assembly<B>,
    request: BuildRequest,
    dir: impl Into<PathBuf>,
) -> Result<BuildHandle>
where
    B: Backend + 'static,
{
    let (tx, rx) = mpsc::channel();
    let cancel = assembly.cancel_token();
    let progress = assembly.progress();
    let dir = dir.into();

    let log_tx = tx.clone();
    let progress_tx = tx.clone();
    let counter = Arc::clone(&progress);
    let events = Events::new(
        move |line| {
            // The receiver may be gone; the build still finishes.
            let _ = log_tx.send(BuildEvent::Log(line.to_string()));
        },
        move |_| {
            let _ = progress_tx.send(BuildEvent::Progress(counter.load(Ordering::SeqCst)));
        },
    );
    let assembly = assembly.with_events(events);

    let thread = thread::Builder::new()
        .name("book-assembly".to_string())
        .spawn(move || {
            let result = assembly.run(request, &dir);
            if let Err(ref e) = result {
                log::error!("build failed: {e}");
            }
            let _ = tx.send(BuildEvent::Finished(result));
        })?;

    Ok(BuildHandle {
        events: rx,
        cancel,
        progress,
        thread: Some(thread),
    })
}
