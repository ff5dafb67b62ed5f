use crate::hypes::Hypes;
use crate::pipeline::stitching::{stitch_rects, RectGrid};
use crate::pipeline::types::{RawPrediction, Rect};
use anyhow::{bail, Result};

/// How raw grid predictions are turned into final boxes.
#[derive(Debug, Clone, Copy)]
pub struct RectangleOptions {
    pub min_conf: f32,
    pub use_stitching: bool,
    pub show_removed: bool,
    pub tau: f32,
}

impl RectangleOptions {
    pub fn from_hypes(hypes: &Hypes, min_conf: f32) -> Self {
        Self {
            min_conf,
            use_stitching: true,
            show_removed: false,
            tau: hypes.tau,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameRects {
    /// Boxes that survived suppression and the confidence threshold
    pub accepted: Vec<Rect>,
    /// Candidates above the threshold that were dropped, only filled with `show_removed`
    pub removed: Vec<Rect>,
}

/// Decodes the cell-relative network outputs into absolute boxes in
/// model-input pixels, grouped as `grid[y][x][n]`.
pub fn decode_rects(hypes: &Hypes, prediction: &RawPrediction) -> Result<RectGrid> {
    let grid_h = hypes.grid_height() as usize;
    let grid_w = hypes.grid_width() as usize;
    let rnn_len = hypes.rnn_len;
    let num_classes = hypes.num_classes;
    let cells = hypes.cell_count();

    if prediction.boxes.len() != cells * rnn_len * 4 {
        bail!(
            "pred_boxes has {} values, expected {} ({}x{} cells, rnn_len {})",
            prediction.boxes.len(),
            cells * rnn_len * 4,
            grid_w,
            grid_h,
            rnn_len
        );
    }
    if prediction.confidences.len() != cells * rnn_len * num_classes {
        bail!(
            "pred_confidences has {} values, expected {} ({} classes)",
            prediction.confidences.len(),
            cells * rnn_len * num_classes,
            num_classes
        );
    }

    let region = hypes.region_size as f32;
    let mut grid = Vec::with_capacity(grid_h);
    for y in 0..grid_h {
        let mut row = Vec::with_capacity(grid_w);
        for x in 0..grid_w {
            let cell = y * grid_w + x;
            let mut cell_rects = Vec::with_capacity(rnn_len);
            for n in 0..rnn_len {
                let b = (cell * rnn_len + n) * 4;
                let c = (cell * rnn_len + n) * num_classes;
                let bx = &prediction.boxes[b..b + 4];
                // channel 0 is background
                let conf = prediction.confidences[c + 1..c + num_classes]
                    .iter()
                    .copied()
                    .fold(0.0f32, f32::max);

                cell_rects.push(Rect::new(
                    region / 2.0 + region * x as f32 + bx[0],
                    region / 2.0 + region * y as f32 + bx[1],
                    bx[2],
                    bx[3],
                    conf,
                ));
            }
            row.push(cell_rects);
        }
        grid.push(row);
    }
    Ok(grid)
}

/// Applies suppression to one frame's predictions and keeps the boxes
/// above `min_conf`, clipped to the model input.
///
/// With stitching, `min_conf` applies to the score of the pass that admitted
/// a box, otherwise to the network's confidence.
pub fn add_rectangles(
    hypes: &Hypes,
    prediction: &RawPrediction,
    opts: &RectangleOptions,
) -> Result<FrameRects> {
    let grid = decode_rects(hypes, prediction)?;
    let all: Vec<Rect> = grid.iter().flatten().flatten().copied().collect();

    let width = hypes.image_width as f32;
    let height = hypes.image_height as f32;
    let visible = |r: &Rect| {
        if r.confidence > opts.min_conf {
            r.clipped(width, height)
        } else {
            None
        }
    };

    if !opts.use_stitching {
        return Ok(FrameRects {
            accepted: all.iter().filter_map(visible).collect(),
            removed: Vec::new(),
        });
    }

    let stitched = stitch_rects(&grid, opts.tau);
    let accepted = stitched.accepted.iter().filter_map(visible).collect();
    let removed = if opts.show_removed {
        all.iter()
            .zip(&stitched.admitted)
            .filter(|(_, admitted)| !**admitted)
            .filter_map(|(r, _)| visible(r))
            .collect()
    } else {
        Vec::new()
    };

    Ok(FrameRects { accepted, removed })
}
