//! Shared texture storage state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use parking_lot::Mutex;

use crate::device::{FilterMode, GpuDevice, TextureDesc, TextureId};
use crate::disposal::DisposalQueue;
use crate::error::RenderError;

/// One pending region write: tightly packed RGBA8, `width * height * 4`
/// bytes, destination coordinates in texels.
#[derive(Debug, Clone)]
pub struct TextureUpload {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl TextureUpload {
    pub fn full(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { x: 0, y: 0, width, height, data }
    }
}

/// The storage record behind one or more [`Texture`](super::Texture)
/// handles.
///
/// Sources are `Send + Sync`: uploads queue from any thread, the reference
/// count moves eagerly, and the decrement that may destroy device storage
/// is routed through the disposal queue. Device storage itself is created
/// lazily by [`prepare`](Self::prepare) on the context thread.
pub(crate) struct TextureSource {
    label: String,
    width: u32,
    height: u32,
    filter: FilterMode,
    disposal: Arc<DisposalQueue>,
    uploads: Mutex<Vec<TextureUpload>>,
    device_id: Mutex<Option<TextureId>>,
    refs: AtomicI32,
    dead: AtomicBool,
}

impl TextureSource {
    pub(crate) fn new(
        disposal: Arc<DisposalQueue>,
        label: &str,
        width: u32,
        height: u32,
        filter: FilterMode,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_owned(),
            width,
            height,
            filter,
            disposal,
            uploads: Mutex::new(Vec::new()),
            device_id: Mutex::new(None),
            refs: AtomicI32::new(0),
            dead: AtomicBool::new(false),
        })
    }

    #[inline]
    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub(crate) fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub(crate) fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub(crate) fn is_alive(&self) -> bool {
        !self.dead.load(Ordering::Acquire)
    }

    /// Whether this source can ever produce device storage. Zero-sized
    /// sources are permanently unavailable placeholders.
    #[inline]
    pub(crate) fn has_storage_dims(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub(crate) fn check_alive(&self) -> Result<(), RenderError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(RenderError::TextureUseAfterFree { name: self.label.clone() })
        }
    }

    /// Counts one more live handle. Eager, so a handle is accounted for the
    /// moment it exists.
    pub(crate) fn retain(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Defers the matching decrement through the disposal queue. The
    /// handle that brings the count to zero marks the source dead and
    /// destroys device storage, all on the context thread.
    pub(crate) fn release(self: &Arc<Self>) {
        let source = Arc::clone(self);
        self.disposal.defer(move |device| {
            if source.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
                source.dead.store(true, Ordering::Release);
                if let Some(id) = source.device_id.lock().take() {
                    device.destroy_texture(id);
                }
                log::trace!("texture '{}' released", source.label);
            }
        });
    }

    pub(crate) fn queue_upload(&self, upload: TextureUpload) -> Result<(), RenderError> {
        self.check_alive()?;
        debug_assert!(
            upload.x + upload.width <= self.width && upload.y + upload.height <= self.height,
            "upload {}x{} at ({}, {}) exceeds texture '{}' ({}x{})",
            upload.width,
            upload.height,
            upload.x,
            upload.y,
            self.label,
            self.width,
            self.height
        );
        debug_assert_eq!(
            upload.data.len(),
            (upload.width * upload.height * 4) as usize,
            "upload data length does not match its dimensions"
        );
        self.uploads.lock().push(upload);
        Ok(())
    }

    /// Context-thread step before a bind: creates device storage on first
    /// use and flushes queued uploads in order. `None` when the source is
    /// dead or zero-sized.
    pub(crate) fn prepare(&self, device: &dyn GpuDevice) -> Option<TextureId> {
        if !self.is_alive() || !self.has_storage_dims() {
            return None;
        }

        let mut slot = self.device_id.lock();
        let id = *slot.get_or_insert_with(|| {
            device.create_texture(TextureDesc {
                label: &self.label,
                width: self.width,
                height: self.height,
                filter: self.filter,
            })
        });

        let pending = std::mem::take(&mut *self.uploads.lock());
        for upload in pending {
            device.upload_texture(
                id,
                upload.x,
                upload.y,
                upload.width,
                upload.height,
                &upload.data,
            );
        }
        Some(id)
    }
}
