//! Core view-state newtypes

use serde::Serialize;

/// Width of the layout container in pixels. Always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ContainerWidth(u32);

/// Error returned when attempting to create a zero-width container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Container width must be >= 1 pixel (got {0})")]
pub struct InvalidContainerWidth(pub u32);

impl ContainerWidth {
    /// Smart constructor that validates width is >= 1.
    pub fn new(width: u32) -> Result<Self, InvalidContainerWidth> {
        if width == 0 {
            Err(InvalidContainerWidth(width))
        } else {
            Ok(Self(width))
        }
    }

    /// Get the raw pixel value.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Width as a float for layout arithmetic.
    pub fn as_f64(&self) -> f64 {
        f64::from(self.0)
    }
}

/// Width-over-height ratio of one thumbnail. Always finite and > 0.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct AspectRatio(f64);

/// Error returned for a zero, negative, or non-finite aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Aspect ratio must be finite and > 0 (got {0})")]
pub struct InvalidAspectRatio(pub f64);

impl AspectRatio {
    /// Smart constructor from a raw ratio.
    pub fn new(ratio: f64) -> Result<Self, InvalidAspectRatio> {
        if ratio.is_finite() && ratio > 0.0 {
            Ok(Self(ratio))
        } else {
            Err(InvalidAspectRatio(ratio))
        }
    }

    /// Ratio of the given pixel dimensions.
    pub fn from_dimensions(width: u32, height: u32) -> Result<Self, InvalidAspectRatio> {
        if height == 0 {
            return Err(InvalidAspectRatio(f64::from(width)));
        }
        Self::new(f64::from(width) / f64::from(height))
    }

    /// Get the raw ratio.
    pub fn get(&self) -> f64 {
        self.0
    }
}

/// Viewport dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportDimensions {
    /// Width in pixels (the container width for layout).
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ViewportDimensions {
    /// Create new viewport dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod container_width {
        use super::*;

        #[test]
        fn rejects_zero() {
            assert_eq!(ContainerWidth::new(0), Err(InvalidContainerWidth(0)));
        }

        #[test]
        fn accepts_positive() {
            let width = ContainerWidth::new(1000).unwrap();
            assert_eq!(width.get(), 1000);
            assert_eq!(width.as_f64(), 1000.0);
        }
    }

    mod aspect_ratio {
        use super::*;

        #[test]
        fn rejects_zero_and_negative() {
            assert!(AspectRatio::new(0.0).is_err());
            assert!(AspectRatio::new(-1.5).is_err());
        }

        #[test]
        fn rejects_non_finite() {
            assert!(AspectRatio::new(f64::NAN).is_err());
            assert!(AspectRatio::new(f64::INFINITY).is_err());
        }

        #[test]
        fn from_dimensions_divides_width_by_height() {
            let ratio = AspectRatio::from_dimensions(400, 250).unwrap();
            assert!((ratio.get() - 1.6).abs() < 1e-12);
        }

        #[test]
        fn from_dimensions_rejects_zero_height() {
            assert!(AspectRatio::from_dimensions(400, 0).is_err());
        }

        #[test]
        fn from_dimensions_rejects_zero_width() {
            assert!(AspectRatio::from_dimensions(0, 250).is_err());
        }
    }
}
