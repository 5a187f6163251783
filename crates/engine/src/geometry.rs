//! Page geometry shared by the renderer and writer

/// Page dimensions in points (1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// US Letter, used when a page has no readable MediaBox
    pub const LETTER: PageSize = PageSize {
        width_pt: 612.0,
        height_pt: 792.0,
    };

    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self {
            width_pt,
            height_pt,
        }
    }
}

/// Clockwise quarter-turn rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalize any multiple of 90 degrees, including negative values
    ///
    /// # Example
    ///
    /// ```
    /// use folio_engine::Rotation;
    ///
    /// assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
    /// assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
    /// assert_eq!(Rotation::from_degrees(45), None);
    /// ```
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            _ => Some(Rotation::Deg270),
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Rotate a further 90 degrees clockwise
    pub fn clockwise(self) -> Self {
        self.add(Rotation::Deg90)
    }

    /// Rotate 90 degrees counter-clockwise
    pub fn counter_clockwise(self) -> Self {
        self.add(Rotation::Deg270)
    }

    pub fn add(self, other: Rotation) -> Self {
        match (self.degrees() + other.degrees()) % 360 {
            0 => Rotation::Deg0,
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            _ => Rotation::Deg270,
        }
    }

    /// Width and height are swapped at 90 and 270 degrees
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Rendered size of a page at a given scale and rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageViewport {
    pub page_size: PageSize,
    pub scale: f32,
    pub rotation: Rotation,

    /// Rendered width in pixels (after rotation)
    pub width: f32,

    /// Rendered height in pixels (after rotation)
    pub height: f32,
}

impl PageViewport {
    pub fn new(page_size: PageSize, scale: f32, rotation: Rotation) -> Self {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let (w, h) = if rotation.is_quarter_turn() {
            (page_size.height_pt, page_size.width_pt)
        } else {
            (page_size.width_pt, page_size.height_pt)
        };
        Self {
            page_size,
            scale,
            rotation,
            width: w * scale,
            height: h * scale,
        }
    }

    /// Integer pixel dimensions, never smaller than 1x1
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}
