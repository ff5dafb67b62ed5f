use crate::pipeline::types::Rect;

/// Candidates grouped by grid cell: `grid[y][x]` holds the `rnn_len`
/// predictions of that cell.
pub type RectGrid = Vec<Vec<Vec<Rect>>>;

/// `(threshold, confidence)` of the stitching passes, strongest first. A box
/// admitted by a pass is rescored with that pass's confidence.
const STITCH_PASSES: [(f32, f32); 12] = [
    (0.80, 1.0),
    (0.70, 0.9),
    (0.60, 0.8),
    (0.50, 0.7),
    (0.40, 0.6),
    (0.30, 0.5),
    (0.20, 0.4),
    (0.10, 0.3),
    (0.05, 0.2),
    (0.02, 0.1),
    (0.005, 0.04),
    (0.0001, 0.01),
];

/// Outcome of stitching one frame.
#[derive(Debug, Clone, Default)]
pub struct Stitched {
    /// Admitted boxes, rescored
    pub accepted: Vec<Rect>,
    /// For every candidate in `grid[y][x][n]` order, whether it was admitted
    pub admitted: Vec<bool>,
}

/// Greedy stitching of per-cell predictions into a deduplicated set of
/// boxes (KittiBox's non-maximum suppression).
///
/// Each pass takes the candidates whose raw confidence lies in
/// `(threshold, previous threshold]`, so boxes are admitted roughly in
/// descending confidence order no matter which cell they come from.
pub fn stitch_rects(grid: &RectGrid, tau: f32) -> Stitched {
    let total: usize = grid.iter().flatten().map(Vec::len).sum();
    let mut stitched = Stitched {
        accepted: Vec::new(),
        admitted: vec![false; total],
    };
    let mut max_threshold = f32::INFINITY;
    for &(threshold, confidence) in STITCH_PASSES.iter() {
        filter_rects(grid, &mut stitched, threshold, max_threshold, confidence, tau);
        max_threshold = threshold;
    }
    stitched
}

/// One stitching pass. For every cell, candidates with raw confidence in
/// `(threshold, max_threshold]` are admitted with score `confidence` unless
/// they overlap a box admitted earlier.
pub fn filter_rects(
    grid: &RectGrid,
    stitched: &mut Stitched,
    threshold: f32,
    max_threshold: f32,
    confidence: f32,
    tau: f32,
) {
    let mut offset = 0;
    for cell in grid.iter().flatten() {
        let mut current: Vec<(usize, &Rect)> = cell
            .iter()
            .enumerate()
            .filter(|(_, r)| r.true_confidence > threshold && r.true_confidence <= max_threshold)
            .map(|(n, r)| (offset + n, r))
            .collect();
        offset += cell.len();

        current.sort_by(|(_, a), (_, b)| {
            b.true_confidence
                .partial_cmp(&a.true_confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for (index, candidate) in current {
            if stitched
                .accepted
                .iter()
                .any(|a| a.overlaps(candidate, tau))
            {
                continue;
            }
            stitched.admitted[index] = true;
            stitched.accepted.push(Rect {
                confidence,
                ..*candidate
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_of(cells: Vec<Vec<Rect>>) -> RectGrid {
        vec![cells]
    }

    #[test]
    fn test_overlapping_boxes_are_merged() {
        let grid = grid_of(vec![
            vec![Rect::new(50.0, 50.0, 40.0, 40.0, 0.95)],
            vec![Rect::new(54.0, 52.0, 40.0, 40.0, 0.85)],
        ]);
        let stitched = stitch_rects(&grid, 0.25);
        assert_eq!(stitched.accepted.len(), 1);
        assert_eq!(stitched.accepted[0].cx, 50.0);
        assert_eq!(stitched.accepted[0].confidence, 1.0);
        assert!((stitched.accepted[0].true_confidence - 0.95).abs() < 1e-6);
        assert_eq!(stitched.admitted, vec![true, false]);
    }

    #[test]
    fn test_distant_boxes_survive() {
        let grid = grid_of(vec![
            vec![Rect::new(50.0, 50.0, 40.0, 40.0, 0.95)],
            vec![Rect::new(300.0, 50.0, 40.0, 40.0, 0.9)],
        ]);
        assert_eq!(stitch_rects(&grid, 0.25).accepted.len(), 2);
    }

    #[test]
    fn test_stronger_box_wins_regardless_of_cell_order() {
        let grid = grid_of(vec![
            vec![Rect::new(54.0, 52.0, 40.0, 40.0, 0.55)],
            vec![Rect::new(50.0, 50.0, 40.0, 40.0, 0.95)],
        ]);
        let stitched = stitch_rects(&grid, 0.25);
        assert_eq!(stitched.accepted.len(), 1);
        assert_eq!(stitched.accepted[0].cx, 50.0);
        assert_eq!(stitched.admitted, vec![false, true]);
    }

    #[test]
    fn test_each_box_is_admitted_once() {
        let grid = grid_of(vec![
            vec![Rect::new(50.0, 50.0, 40.0, 40.0, 0.45)],
            vec![Rect::new(300.0, 50.0, 40.0, 40.0, 0.001)],
        ]);
        let stitched = stitch_rects(&grid, 0.25);
        assert_eq!(stitched.accepted.len(), 2);
        assert!((stitched.accepted[0].true_confidence - 0.45).abs() < 1e-6);
        assert_eq!(stitched.accepted[0].confidence, 0.6);
        assert_eq!(stitched.accepted[1].confidence, 0.01);
    }

    #[test]
    fn test_identical_candidates_are_tracked_by_position() {
        let twin = Rect::new(50.0, 50.0, 40.0, 40.0, 0.9);
        let grid = grid_of(vec![vec![twin], vec![twin]]);
        let stitched = stitch_rects(&grid, 0.25);
        assert_eq!(stitched.accepted.len(), 1);
        assert_eq!(stitched.admitted, vec![true, false]);
    }

    #[test]
    fn test_zero_confidence_is_never_admitted() {
        let grid = grid_of(vec![vec![Rect::new(50.0, 50.0, 40.0, 40.0, 0.0)]]);
        let stitched = stitch_rects(&grid, 0.25);
        assert!(stitched.accepted.is_empty());
        assert_eq!(stitched.admitted, vec![false]);
    }

    #[test]
    fn test_empty_grid() {
        let stitched = stitch_rects(&Vec::new(), 0.25);
        assert!(stitched.accepted.is_empty());
        assert!(stitched.admitted.is_empty());
    }
}
