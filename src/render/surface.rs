//! Drawing surface with a logical layout size and a device-pixel backing store.

use anyhow::{anyhow, Result};
use std::cell::RefCell;
use std::rc::Rc;
use tiny_skia::{Color, Pixmap};

/// The most recently published frame, read by the video capture track.
pub type FrameSlot = Rc<RefCell<Option<Pixmap>>>;

/// Opaque container background behind the scene.
pub const BACKGROUND: (u8, u8, u8) = (5, 8, 20);

pub struct Surface {
    logical_width: f32,
    logical_height: f32,
    device_pixel_ratio: f32,
    pixmap: Pixmap,
    reallocations: usize,
    slot: FrameSlot,
}

impl Surface {
    /// Creates a surface for a `width` x `height` layout box.
    ///
    /// # Errors
    /// - If the computed backing store cannot be allocated
    pub fn new(width: f32, height: f32, device_pixel_ratio: f32) -> Result<Self> {
        let dpr = sanitize_ratio(device_pixel_ratio);
        let (w, h) = backing_size(width, height, dpr);
        let pixmap = Pixmap::new(w, h).ok_or_else(|| anyhow!("Cannot allocate a {w}x{h} surface"))?;
        Ok(Self {
            logical_width: width.max(1.0),
            logical_height: height.max(1.0),
            device_pixel_ratio: dpr,
            pixmap,
            reallocations: 0,
            slot: Rc::new(RefCell::new(None)),
        })
    }

    #[cfg(test)]
    /// Updates the layout box; the backing store follows on the next sync.
    pub fn set_layout_size(&mut self, width: f32, height: f32) {
        self.logical_width = width.max(1.0);
        self.logical_height = height.max(1.0);
    }

    #[cfg(test)]
    pub fn set_device_pixel_ratio(&mut self, ratio: f32) {
        self.device_pixel_ratio = sanitize_ratio(ratio);
    }

    /// Reallocates the backing store if the computed size changed.
    ///
    /// Returns whether a reallocation happened.
    pub fn sync_backing_size(&mut self) -> bool {
        let (w, h) = backing_size(self.logical_width, self.logical_height, self.device_pixel_ratio);
        if w == self.pixmap.width() && h == self.pixmap.height() {
            return false;
        }
        match Pixmap::new(w, h) {
            Some(pixmap) => {
                self.pixmap = pixmap;
                self.reallocations += 1;
                tracing::debug!("Surface resized to {}x{} ({} reallocations)", w, h, self.reallocations);
                true
            }
            None => {
                tracing::warn!("Cannot allocate a {}x{} surface, keeping previous size", w, h);
                false
            }
        }
    }

    /// Clears the backing store to the opaque background.
    pub fn clear(&mut self) {
        let (r, g, b) = BACKGROUND;
        self.pixmap.fill(Color::from_rgba8(r, g, b, 255));
    }

    pub fn logical_size(&self) -> (f32, f32) {
        (self.logical_width, self.logical_height)
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    pub fn backing_size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    #[cfg(test)]
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    #[cfg(test)]
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    /// Copies the painted pixels into the frame slot, reusing its buffer
    /// when the dimensions match.
    pub fn publish(&self) {
        let mut slot = self.slot.borrow_mut();
        match slot.as_mut() {
            Some(frame)
                if frame.width() == self.pixmap.width() && frame.height() == self.pixmap.height() =>
            {
                frame.data_mut().copy_from_slice(self.pixmap.data());
            }
            _ => *slot = Some(self.pixmap.clone()),
        }
    }

    pub fn frame_slot(&self) -> FrameSlot {
        Rc::clone(&self.slot)
    }
}

fn sanitize_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

fn backing_size(width: f32, height: f32, dpr: f32) -> (u32, u32) {
    let w = (width.max(1.0) * dpr).round().max(1.0) as u32;
    let h = (height.max(1.0) * dpr).round().max(1.0) as u32;
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backing_size_tracks_pixel_ratio() {
        let surface = Surface::new(640.0, 360.0, 2.0).unwrap();
        assert_eq!(surface.backing_size(), (1280, 720));
        assert_eq!(surface.logical_size(), (640.0, 360.0));
    }

    #[test]
    fn test_sync_reallocates_only_on_change() {
        let mut surface = Surface::new(320.0, 180.0, 1.0).unwrap();
        for _ in 0..10 {
            assert!(!surface.sync_backing_size());
        }
        assert_eq!(surface.reallocations(), 0);

        surface.set_layout_size(400.0, 180.0);
        assert!(surface.sync_backing_size());
        assert!(!surface.sync_backing_size());
        surface.set_device_pixel_ratio(1.5);
        assert!(surface.sync_backing_size());
        assert_eq!(surface.backing_size(), (600, 270));
        assert_eq!(surface.reallocations(), 2);
    }

    #[test]
    fn test_invalid_ratio_falls_back_to_one() {
        let surface = Surface::new(10.0, 10.0, f32::NAN).unwrap();
        assert_eq!(surface.device_pixel_ratio(), 1.0);
    }

    #[test]
    fn test_publish_shares_latest_pixels() {
        let mut surface = Surface::new(4.0, 4.0, 1.0).unwrap();
        let slot = surface.frame_slot();
        assert!(slot.borrow().is_none());

        surface.clear();
        surface.publish();
        let first = slot.borrow().as_ref().unwrap().pixel(0, 0).unwrap();
        assert_eq!((first.red(), first.green(), first.blue(), first.alpha()), (5, 8, 20, 255));

        surface.pixmap_mut().fill(Color::WHITE);
        surface.publish();
        let second = slot.borrow().as_ref().unwrap().pixel(0, 0).unwrap();
        assert_eq!(second.red(), 255);
    }
}
