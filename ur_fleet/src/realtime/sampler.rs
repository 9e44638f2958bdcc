use tracing::{debug, warn};

use super::RealtimeRecord;
use crate::events::{EventBus, FleetEvent};
use crate::DecodeError;

/// Holds the latest realtime frame of one connection between decode ticks.
///
/// A newer frame silently replaces one that has not been decoded yet. On each
/// tick the held frame is published raw and then parsed, in that order. A
/// frame that fails to decode is kept for the next tick and its defect is
/// logged once until a decode succeeds.
#[derive(Debug)]
pub struct RealtimeSampler {
    address: String,
    latest: Option<Vec<u8>>,
    last_error: Option<DecodeError>,
}

impl RealtimeSampler {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            latest: None,
            last_error: None,
        }
    }

    pub fn store(&mut self, frame: &[u8]) {
        if self.latest.is_some() {
            debug!("{}: dropping undecoded realtime frame", self.address);
        }
        self.latest = Some(frame.to_vec());
    }

    pub fn has_frame(&self) -> bool {
        self.latest.is_some()
    }

    /// Publishes the held frame, if any. Returns the decoded record.
    pub fn tick(&mut self, events: &EventBus) -> Option<RealtimeRecord> {
        let frame = self.latest.as_ref()?;
        events.publish(FleetEvent::RealtimeRaw {
            address: self.address.clone(),
            data: frame.clone(),
        });
        match RealtimeRecord::decode(frame) {
            Ok(record) => {
                self.latest = None;
                self.last_error = None;
                events.publish(FleetEvent::RealtimeParsed {
                    address: self.address.clone(),
                    record: Box::new(record.clone()),
                });
                Some(record)
            }
            Err(e) => {
                if self.last_error != Some(e) {
                    warn!("{}: skipping realtime decode: {}", self.address, e);
                    self.last_error = Some(e);
                }
                None
            }
        }
    }
}
