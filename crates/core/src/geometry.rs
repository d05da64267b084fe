/// A square region inside a source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

/// Largest centered square inside a `width × height` frame.
///
/// Returns `None` for an empty frame.
#[must_use]
pub fn center_square(width: u32, height: u32) -> Option<CropRect> {
    let side = width.min(height);
    if side == 0 {
        return None;
    }
    Some(CropRect {
        x: (width - side) / 2,
        y: (height - side) / 2,
        side,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_crops_horizontally() {
        assert_eq!(
            center_square(640, 480),
            Some(CropRect { x: 80, y: 0, side: 480 })
        );
    }

    #[test]
    fn portrait_crops_vertically() {
        assert_eq!(
            center_square(720, 1280),
            Some(CropRect { x: 0, y: 280, side: 720 })
        );
    }

    #[test]
    fn square_is_untouched() {
        assert_eq!(
            center_square(224, 224),
            Some(CropRect { x: 0, y: 0, side: 224 })
        );
    }

    #[test]
    fn odd_margin_rounds_down() {
        assert_eq!(
            center_square(101, 100),
            Some(CropRect { x: 0, y: 0, side: 100 })
        );
        assert_eq!(center_square(103, 100).map(|r| r.x), Some(1));
    }

    #[test]
    fn empty_frame_has_no_crop() {
        assert_eq!(center_square(0, 480), None);
    }
}
