use crate::pipeline::rectangles::FrameRects;
use crate::pipeline::types::Rect;
use anyhow::Result;
use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc::{rectangle_points, LINE_8};

/// BGR colors
pub const ACCEPTED_COLOR: (f64, f64, f64) = (0.0, 255.0, 0.0);
pub const REMOVED_COLOR: (f64, f64, f64) = (0.0, 0.0, 255.0);
const THICKNESS: i32 = 2;

fn scalar((b, g, r): (f64, f64, f64)) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

fn draw_rect(image: &mut Mat, rect: &Rect, color: Scalar) -> Result<()> {
    rectangle_points(
        image,
        Point::new(rect.x1() as i32, rect.y1() as i32),
        Point::new(rect.x2() as i32, rect.y2() as i32),
        color,
        THICKNESS,
        LINE_8,
        0,
    )?;
    Ok(())
}

/// Draws removed candidates first so accepted boxes stay on top.
pub fn draw_rects(image: &mut Mat, rects: &FrameRects) -> Result<()> {
    for r in &rects.removed {
        draw_rect(image, r, scalar(REMOVED_COLOR))?;
    }
    for r in &rects.accepted {
        draw_rect(image, r, scalar(ACCEPTED_COLOR))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Vec3b, CV_8UC3};
    use opencv::prelude::*;

    #[test]
    fn test_accepted_boxes_are_green() {
        let mut image =
            Mat::new_rows_cols_with_default(64, 64, CV_8UC3, Scalar::all(0.0)).unwrap();
        let rects = FrameRects {
            accepted: vec![Rect::new(32.0, 32.0, 20.0, 20.0, 0.9)],
            removed: vec![Rect::new(10.0, 50.0, 8.0, 8.0, 0.6)],
        };
        draw_rects(&mut image, &rects).unwrap();

        // top-left corner of the accepted box
        let px = *image.at_2d::<Vec3b>(22, 22).unwrap();
        assert_eq!(px, Vec3b::from([0, 255, 0]));
        // top-left corner of the removed box
        let px = *image.at_2d::<Vec3b>(46, 6).unwrap();
        assert_eq!(px, Vec3b::from([0, 0, 255]));
        // untouched center
        let px = *image.at_2d::<Vec3b>(32, 32).unwrap();
        assert_eq!(px, Vec3b::from([0, 0, 0]));
    }
}
