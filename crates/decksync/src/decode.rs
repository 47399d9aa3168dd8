use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;
use keyface::MediaHint;
use tracing::debug;

use crate::error::SyncError;
use crate::sync::SyncMessage;

/// Decodes `bytes` off the engine thread and posts the outcome back to the
/// engine inbox, tagged with `ticket` so superseded uploads can be ignored.
pub(crate) fn spawn_decode(
    key: usize,
    ticket: u64,
    bytes: Vec<u8>,
    hint: MediaHint,
    inbox: Sender<SyncMessage>,
) -> Result<(), SyncError> {
    thread::Builder::new()
        .name(format!("facedeck-decode-{key:02}"))
        .spawn(move || {
            let message = match keyface::decode(&bytes, hint) {
                Ok(image) => {
                    debug!(key, ticket, ?image, "decoded upload");
                    SyncMessage::ImageDecoded {
                        key,
                        ticket,
                        image: Arc::new(image),
                    }
                }
                Err(err) => SyncMessage::ImageDecodeFailed {
                    key,
                    ticket,
                    reason: err.to_string(),
                },
            };
            let _ = inbox.send(message);
        })
        .map(|_| ())
        .map_err(SyncError::Spawn)
}
