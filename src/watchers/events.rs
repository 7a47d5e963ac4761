//! Upload-event bus
//!
//! Watchers announce completed uploads here; the scheduler drains the bus to
//! decide burst polls. Publishing is non-blocking: when the bus is full the
//! event is dropped, since a missed burst only delays the next poll.

use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEventKind {
    ParamOptUploaded,
    DailySummaryUploaded,
}

#[derive(Debug, Clone)]
pub struct UploadEvent {
    pub kind: UploadEventKind,
    pub file_name: String,
    pub job_id: String,
}

const BUS_CAPACITY: usize = 100;

pub fn upload_event_bus() -> (mpsc::Sender<UploadEvent>, mpsc::Receiver<UploadEvent>) {
    mpsc::channel(BUS_CAPACITY)
}

/// Publishes without blocking; a full bus drops the event.
pub fn publish(tx: &mpsc::Sender<UploadEvent>, event: UploadEvent) {
    match tx.try_send(event) {
        Ok(()) => debug!("upload event published"),
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(job_id = %event.job_id, "upload event bus full, dropping event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("upload event bus closed");
        }
    }
}
