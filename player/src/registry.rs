use crate::decoder::{Decoder, DecoderBackend};
use quadview_common::{OpenError, SlotKey};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One named channel and the decoder it currently owns.
pub struct StreamSlot {
    key: SlotKey,
    decoder: Option<Box<dyn Decoder>>,
}

impl StreamSlot {
    fn empty(key: SlotKey) -> Self {
        Self { key, decoder: None }
    }

    pub fn key(&self) -> &SlotKey {
        &self.key
    }

    /// A slot is valid while it holds an open decoder
    pub fn is_valid(&self) -> bool {
        self.decoder.as_ref().is_some_and(|d| d.is_open())
    }
}

/// Fixed arena of stream slots indexed by key.
///
/// Each slot owns its decoder exclusively. Replacing a handle releases the
/// old one before the new one becomes visible, and a failed open never
/// touches the slot.
pub struct StreamRegistry {
    slots: Vec<StreamSlot>,
    backend: Arc<dyn DecoderBackend>,
}

impl StreamRegistry {
    pub fn new(keys: Vec<SlotKey>, backend: Arc<dyn DecoderBackend>) -> Self {
        Self {
            slots: keys.into_iter().map(StreamSlot::empty).collect(),
            backend,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &SlotKey> {
        self.slots.iter().map(|slot| &slot.key)
    }

    /// Open `path` into `key`, replacing whatever the slot held.
    pub async fn open(&mut self, key: &SlotKey, path: &Path) -> Result<(), OpenError> {
        let index = self
            .slots
            .iter()
            .position(|slot| &slot.key == key)
            .ok_or_else(|| OpenError::UnknownSlot(key.clone()))?;

        debug!("Opening {:?} into slot {}", path, key);
        let mut decoder = self.backend.open(path).await.inspect_err(|e| {
            warn!("Slot {}: {}", key, e);
        })?;

        if !decoder.is_open() || decoder.frame_width() == 0 {
            decoder.release();
            warn!("Slot {}: {:?} has no video stream", key, path);
            return Err(OpenError::unopenable(path, "no video stream (zero frame width)"));
        }

        let slot = &mut self.slots[index];
        if let Some(mut previous) = slot.decoder.take() {
            debug!("Slot {}: releasing previous source {:?}", key, previous.source());
            previous.release();
        }
        slot.decoder = Some(decoder);

        info!("Slot {} opened {:?}", key, path);
        Ok(())
    }

    pub fn get(&self, key: &SlotKey) -> Option<&dyn Decoder> {
        self.slots
            .iter()
            .find(|slot| &slot.key == key && slot.is_valid())
            .and_then(|slot| slot.decoder.as_deref())
    }

    pub fn get_mut(&mut self, key: &SlotKey) -> Option<&mut (dyn Decoder + 'static)> {
        self.slots
            .iter_mut()
            .find(|slot| &slot.key == key && slot.is_valid())
            .and_then(|slot| slot.decoder.as_deref_mut())
    }

    /// Keys of slots holding a usable handle, in configured order
    pub fn valid_slots(&self) -> Vec<SlotKey> {
        self.slots
            .iter()
            .filter(|slot| slot.is_valid())
            .map(|slot| slot.key.clone())
            .collect()
    }

    pub fn all_slots_filled(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(StreamSlot::is_valid)
    }

    pub(crate) fn valid_decoders(&self) -> impl Iterator<Item = (&SlotKey, &dyn Decoder)> {
        self.slots
            .iter()
            .filter(|slot| slot.is_valid())
            .filter_map(|slot| slot.decoder.as_deref().map(|decoder| (&slot.key, decoder)))
    }

    pub(crate) fn valid_decoders_mut(
        &mut self,
    ) -> impl Iterator<Item = (&SlotKey, &mut Box<dyn Decoder>)> {
        self.slots
            .iter_mut()
            .filter(|slot| slot.is_valid())
            .filter_map(|slot| {
                let StreamSlot { key, decoder } = slot;
                let key: &SlotKey = key;
                decoder.as_mut().map(|decoder| (key, decoder))
            })
    }

    /// Release every handle; safe to call more than once
    pub fn release_all(&mut self) {
        for slot in &mut self.slots {
            if let Some(mut decoder) = slot.decoder.take() {
                debug!("Slot {}: releasing {:?}", slot.key, decoder.source());
                decoder.release();
            }
        }
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}
