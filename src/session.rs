use crate::catalog::Catalog;
use crate::error::SessionError;
use crate::extract::{extract_selected, ExtractEvent, ExtractOptions};
use crate::inspect::{InspectEvent, InspectOverrides, Inspector};
use crate::mods::Mod;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc,
    },
    thread,
    time::Duration,
};

#[derive(Debug, Clone)]
pub enum SessionMessage {
    Inspection(InspectEvent),
    InspectionCompleted {
        archive: PathBuf,
        mods: Vec<Mod>,
    },
    InspectionFailed {
        archive: PathBuf,
        error: String,
    },
    Extraction(ExtractEvent),
    ExtractionCompleted {
        archive: PathBuf,
        extracted: Vec<Mod>,
    },
    ExtractionFailed {
        archive: PathBuf,
        error: String,
    },
}

/// Runs inspection and extraction off the caller's thread.
///
/// Each kind of work has its own worker; one of each may run at a time. All
/// progress comes back through [`ImportSession::try_recv`] and friends.
pub struct ImportSession {
    catalog: Arc<dyn Catalog>,
    tx: Sender<SessionMessage>,
    rx: Receiver<SessionMessage>,
    inspection_active: Arc<AtomicBool>,
    extraction_active: Arc<AtomicBool>,
}

/// Clears a busy flag when the worker finishes, including by panic.
struct ActiveGuard(Arc<AtomicBool>);

impl ActiveGuard {
    fn acquire(flag: &Arc<AtomicBool>, kind: &'static str) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SessionError::Busy(kind))?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ImportSession {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            catalog,
            tx,
            rx,
            inspection_active: Arc::new(AtomicBool::new(false)),
            extraction_active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn inspection_active(&self) -> bool {
        self.inspection_active.load(Ordering::SeqCst)
    }

    pub fn extraction_active(&self) -> bool {
        self.extraction_active.load(Ordering::SeqCst)
    }

    pub fn start_inspection(
        &self,
        archive: PathBuf,
        overrides: InspectOverrides,
    ) -> Result<(), SessionError> {
        let guard = ActiveGuard::acquire(&self.inspection_active, "inspection")?;
        let catalog = Arc::clone(&self.catalog);
        let tx = self.tx.clone();
        log::info!("Inspection started: {}", archive.display());

        thread::Builder::new()
            .name("mod-inspector".to_string())
            .spawn(move || {
                let events = tx.clone();
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    Inspector::new(catalog.as_ref()).inspect_archive(
                        &archive,
                        &overrides,
                        &mut |event| {
                            let _ = events.send(SessionMessage::Inspection(event));
                        },
                    )
                }));
                let message = match result {
                    Ok(Ok(mods)) => SessionMessage::InspectionCompleted { archive, mods },
                    Ok(Err(err)) => {
                        log::warn!("Inspection of {} failed: {err}", archive.display());
                        SessionMessage::InspectionFailed {
                            archive,
                            error: err.to_string(),
                        }
                    }
                    Err(payload) => {
                        let error = panic_message(payload.as_ref());
                        log::error!("Inspection of {} crashed: {error}", archive.display());
                        SessionMessage::InspectionFailed { archive, error }
                    }
                };
                drop(guard);
                let _ = tx.send(message);
            })?;
        Ok(())
    }

    /// Extracts the selected entries of `mods`; unselected mods are ignored.
    pub fn start_extraction(
        &self,
        archive: PathBuf,
        mods: Vec<Mod>,
        options: ExtractOptions,
    ) -> Result<(), SessionError> {
        let guard = ActiveGuard::acquire(&self.extraction_active, "extraction")?;
        let tx = self.tx.clone();
        log::info!("Extraction started: {}", archive.display());

        thread::Builder::new()
            .name("mod-extractor".to_string())
            .spawn(move || {
                let events = tx.clone();
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    extract_selected(&archive, &mods, &options, &mut |event| {
                        let _ = events.send(SessionMessage::Extraction(event));
                    })
                }));
                let message = match result {
                    Ok(Ok(extracted)) => SessionMessage::ExtractionCompleted { archive, extracted },
                    Ok(Err(err)) => {
                        log::warn!("Extraction from {} failed: {err:#}", archive.display());
                        SessionMessage::ExtractionFailed {
                            archive,
                            error: format!("{err:#}"),
                        }
                    }
                    Err(payload) => {
                        let error = panic_message(payload.as_ref());
                        log::error!("Extraction from {} crashed: {error}", archive.display());
                        SessionMessage::ExtractionFailed { archive, error }
                    }
                };
                drop(guard);
                let _ = tx.send(message);
            })?;
        Ok(())
    }

    pub fn try_recv(&self) -> Option<SessionMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<SessionMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Blocks until the next message. The session keeps a sender of its own,
    /// so only call this while work is running.
    pub fn recv(&self) -> Option<SessionMessage> {
        self.rx.recv().ok()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    format!("worker panicked: {detail}")
}
