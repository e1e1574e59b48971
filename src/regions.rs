use crate::editor::EditorError;
use crate::types::Region;

/// Smallest selection accepted, measured in display pixels before scaling.
pub const MIN_SELECTION_PX: f64 = 10.0;

/// A drag-selection as the browser reports it, in on-screen pixels of the
/// scaled-down preview image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Per-axis factors mapping display pixels to native screenshot pixels.
/// The preview size depends on viewport/CSS while the screenshot does not,
/// so this must be rebuilt for every capture.
#[derive(Debug, Clone, Copy)]
pub struct CaptureScale {
    sx: f64,
    sy: f64,
}

impl CaptureScale {
    pub fn new(native_width: u32, native_height: u32, display_width: f64, display_height: f64) -> Self {
        CaptureScale {
            sx: f64::from(native_width) / display_width,
            sy: f64::from(native_height) / display_height,
        }
    }

    /// Convert a display-space selection to native screenshot pixels,
    /// rounding each axis independently.
    pub fn to_native(&self, rect: DisplayRect) -> (u32, u32, u32, u32) {
        (
            (rect.x * self.sx).round() as u32,
            (rect.y * self.sy).round() as u32,
            (rect.width * self.sx).round() as u32,
            (rect.height * self.sy).round() as u32,
        )
    }
}

/// Ordered list of named OCR regions for the current capture.
#[derive(Debug, Default)]
pub struct RegionListEditor {
    regions: Vec<Region>,
}

impl RegionListEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_regions(regions: Vec<Region>) -> Self {
        RegionListEditor { regions }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Validate and append a region. The whole operation aborts — nothing is
    /// added — on an empty or duplicate name, or a selection smaller than
    /// `MIN_SELECTION_PX` per axis in display space.
    pub fn create(
        &mut self,
        rect: DisplayRect,
        name: &str,
        scale: CaptureScale,
    ) -> Result<&Region, EditorError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EditorError::Validation {
                field: "name",
                reason: "region name is required".into(),
            });
        }
        if self.regions.iter().any(|r| r.name == name) {
            return Err(EditorError::Validation {
                field: "name",
                reason: format!("region \"{name}\" already exists"),
            });
        }
        if rect.width < MIN_SELECTION_PX || rect.height < MIN_SELECTION_PX {
            return Err(EditorError::Validation {
                field: "selection",
                reason: format!("selection must be at least {MIN_SELECTION_PX}px on each side"),
            });
        }

        let (x, y, width, height) = scale.to_native(rect);
        self.regions.push(Region {
            name: name.to_string(),
            x,
            y,
            width,
            height,
        });
        Ok(self.regions.last().unwrap())
    }

    pub fn delete(&mut self, index: usize) -> Result<Region, EditorError> {
        if index >= self.regions.len() {
            return Err(EditorError::Index {
                index,
                len: self.regions.len(),
            });
        }
        Ok(self.regions.remove(index))
    }

    pub fn move_up(&mut self, index: usize) -> Result<bool, EditorError> {
        if index >= self.regions.len() {
            return Err(EditorError::Index {
                index,
                len: self.regions.len(),
            });
        }
        if index == 0 {
            return Ok(false);
        }
        self.regions.swap(index - 1, index);
        Ok(true)
    }

    pub fn move_down(&mut self, index: usize) -> Result<bool, EditorError> {
        if index >= self.regions.len() {
            return Err(EditorError::Index {
                index,
                len: self.regions.len(),
            });
        }
        if index + 1 == self.regions.len() {
            return Ok(false);
        }
        self.regions.swap(index, index + 1);
        Ok(true)
    }
}
