use serde::{Deserialize, Serialize};

// MARK: - CaptureRegion

/// Rectangle in compositor/global coordinates chosen by the selection UI.
///
/// A plain value: every selection cycle produces a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Last row covered by the region (inclusive), as in `QRect::bottom`.
    /// Saturates at the `i32` bounds for regions reaching past them.
    pub fn bottom(&self) -> i32 {
        let bottom = i64::from(self.y) + i64::from(self.height) - 1;
        bottom.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Where the toolbar goes: left-aligned with the region, below it, but
    /// never closer than two toolbar heights to the bottom of the window.
    pub fn toolbar_anchor(&self, window_height: i32, toolbar_height: i32) -> (i32, i32) {
        let limit = window_height.saturating_sub(toolbar_height.saturating_mul(2));
        (self.x, self.bottom().min(limit))
    }
}

impl std::fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

// MARK: - CaptureMode

/// What happens when the user finishes the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    #[default]
    Screenshot,
    Record,
}

impl CaptureMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Screenshot => Self::Record,
            Self::Record => Self::Screenshot,
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Screenshot => write!(f, "Screenshot"),
            Self::Record => write!(f, "Record"),
        }
    }
}

// MARK: - SourceKinds

/// Set of source kinds offered by the selection UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceKinds(u32);

impl SourceKinds {
    pub const OUTPUT: Self = Self(1);
    pub const WINDOW: Self = Self(1 << 1);
    pub const REGION: Self = Self(1 << 2);
    pub const ALL: Self = Self(Self::OUTPUT.0 | Self::WINDOW.0 | Self::REGION.0);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SourceKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// MARK: - SurfaceHandle

/// Opaque id of an on-screen surface, passed to the selection UI so it does not
/// capture the application's own window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

// MARK: - SourceSelection

/// Arguments of a selection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSelection {
    pub kinds: SourceKinds,
    pub allow_multiple: bool,
    pub freeze: bool,
    pub exclude_surface: Option<SurfaceHandle>,
}

impl SourceSelection {
    /// Output, window and free-form region at once; single source, live.
    pub fn any_source(exclude_surface: Option<SurfaceHandle>) -> Self {
        Self {
            kinds: SourceKinds::ALL,
            allow_multiple: false,
            freeze: false,
            exclude_surface,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolbar_sits_below_region() {
        let region = CaptureRegion::new(100, 50, 400, 300);
        assert_eq!(region.bottom(), 349);
        assert_eq!(region.toolbar_anchor(1080, 40), (100, 349));
    }

    #[test]
    fn bottom_saturates_for_extreme_regions() {
        assert_eq!(CaptureRegion::new(i32::MAX, i32::MAX, u32::MAX, u32::MAX).bottom(), i32::MAX);
        assert_eq!(CaptureRegion::new(0, 0, 1, u32::MAX).bottom(), i32::MAX);
        assert_eq!(CaptureRegion::new(0, 10, 0, 0).bottom(), 9);
        assert_eq!(CaptureRegion::new(0, i32::MIN, 0, 0).bottom(), i32::MIN);
        let region = CaptureRegion::new(5, 2_000_000_000, 2_000_000_000, 10);
        assert_eq!(region.toolbar_anchor(i32::MIN, i32::MAX), (5, i32::MIN));
    }

    #[test]
    fn toolbar_clamped_near_window_bottom() {
        let region = CaptureRegion::new(0, 700, 200, 380);
        assert_eq!(region.toolbar_anchor(1080, 40), (0, 1000));
    }

    #[test]
    fn any_source_requests_all_kinds() {
        let sel = SourceSelection::any_source(Some(SurfaceHandle(7)));
        assert!(sel.kinds.contains(SourceKinds::OUTPUT | SourceKinds::WINDOW));
        assert!(sel.kinds.contains(SourceKinds::REGION));
        assert!(!sel.allow_multiple);
        assert!(!sel.freeze);
        assert_eq!(sel.exclude_surface, Some(SurfaceHandle(7)));
    }

    #[test]
    fn mode_toggles() {
        assert_eq!(CaptureMode::default().toggled(), CaptureMode::Record);
        assert_eq!(CaptureMode::Record.toggled(), CaptureMode::Screenshot);
    }
}
