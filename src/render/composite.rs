//! Summary page: the stage figures stitched into one SVG.
//!
//! Rows are laid out top to bottom. Each row is as wide as its figures side by
//! side and as tall as its tallest figure; figures are centred vertically in
//! their row and rows are centred horizontally on the widest one. The whole
//! page is then scaled to the requested width.

use crate::render::Artifact;

/// Placement of every figure on the unscaled page.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// `(x, y)` offsets, one per figure, row by row.
    pub offsets: Vec<Vec<(f64, f64)>>,
    pub width: f64,
    pub height: f64,
}

/// Lay out rows of `(width, height)` boxes.
pub fn layout(rows: &[Vec<(u32, u32)>]) -> Layout {
    let row_w = |row: &Vec<(u32, u32)>| row.iter().map(|(w, _)| *w as f64).sum::<f64>();
    let row_h = |row: &Vec<(u32, u32)>| row.iter().map(|(_, h)| *h as f64).fold(0.0, f64::max);
    let width = rows.iter().map(row_w).fold(0.0, f64::max);

    let mut y = 0.0;
    let mut offsets = Vec::with_capacity(rows.len());
    for row in rows {
        let h = row_h(row);
        let mut x = (width - row_w(row)) / 2.0;
        let mut placed = Vec::with_capacity(row.len());
        for &(w, ih) in row {
            placed.push((x, y + (h - ih as f64) / 2.0));
            x += w as f64;
        }
        offsets.push(placed);
        y += h;
    }
    Layout { offsets, width, height: y }
}

/// Drop any XML declaration so the figure can be nested.
fn inner_svg(svg: &str) -> &str {
    let svg = svg.trim_start();
    match (svg.starts_with("<?xml"), svg.find("?>")) {
        (true, Some(end)) => svg[end + 2..].trim_start(),
        _ => svg,
    }
}

/// Compose `rows` of figures into one SVG document `target_width` pixels wide.
pub fn compose_summary(rows: &[Vec<&Artifact>], target_width: u32) -> String {
    let sizes: Vec<Vec<(u32, u32)>> = rows
        .iter()
        .map(|row| row.iter().map(|a| (a.width, a.height)).collect())
        .collect();
    let page = layout(&sizes);
    let scale = if page.width > 0.0 { target_width as f64 / page.width } else { 1.0 };
    let height = (page.height * scale).round() as u64;

    let mut out = String::new();
    out.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{target_width}\" height=\"{height}\" viewBox=\"0 0 {target_width} {height}\">\n"
    ));
    out.push_str("<rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
    out.push_str(&format!("<g transform=\"scale({scale:.6})\">\n"));
    for (row, offsets) in rows.iter().zip(&page.offsets) {
        for (art, (x, y)) in row.iter().zip(offsets) {
            out.push_str(&format!("<g transform=\"translate({x:.2},{y:.2})\">\n"));
            out.push_str(inner_svg(&art.svg));
            out.push_str("\n</g>\n");
        }
    }
    out.push_str("</g>\n</svg>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(index: u32, width: u32, height: u32) -> Artifact {
        Artifact {
            index: Some(index),
            name: "t",
            width,
            height,
            svg: format!("<?xml version=\"1.0\"?>\n<svg width=\"{width}\" height=\"{height}\"></svg>"),
        }
    }

    #[test]
    fn rows_are_centred_horizontally_and_items_vertically() {
        let page = layout(&[vec![(100, 50), (100, 80)], vec![(100, 40)]]);
        assert_eq!(page.width, 200.0);
        assert_eq!(page.height, 120.0);
        assert_eq!(page.offsets[0], vec![(0.0, 15.0), (100.0, 0.0)]);
        assert_eq!(page.offsets[1], vec![(50.0, 80.0)]);
    }

    #[test]
    fn summary_is_scaled_to_target_width() {
        let (a, b, c) = (artifact(1, 800, 800), artifact(2, 800, 800), artifact(3, 1000, 700));
        let svg = compose_summary(&[vec![&a, &b], vec![&c]], 3000);
        // Widest row is 1600 px, so everything is scaled by 1.875.
        assert!(svg.contains("scale(1.875000)"));
        assert!(svg.contains("height=\"2813\""));
        assert!(svg.contains("translate(300.00,800.00)"));
        assert_eq!(svg.matches("<?xml").count(), 0);
        assert_eq!(svg.matches("<svg").count(), 4);
    }

    #[test]
    fn empty_page_is_still_valid_svg() {
        let svg = compose_summary(&[], 3000);
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }
}
