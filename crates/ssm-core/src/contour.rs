//! Contour polylines: line connectivity and VTK PolyData export.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use tracing::info;

use crate::error::{SsmError, SsmResult};

/// Line segments as pairs of point indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineSet {
    pub lines: Vec<[usize; 2]>,
}

impl LineSet {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize; 2]> {
        self.lines.iter()
    }
}

/// Connect successive points of a polyline.
///
/// Closed contours yield `n` segments `(i, (i + 1) % n)`, so the last
/// segment returns to point 0. Open contours yield `n - 1` segments with no
/// wraparound. A single closed point connects to itself.
///
/// Returns `InvalidInput` when `point_count` is zero.
pub fn compute_line_indices(point_count: usize, is_closed: bool) -> SsmResult<LineSet> {
    if point_count == 0 {
        return Err(SsmError::invalid_input(
            "a contour needs at least one point",
        ));
    }
    let segments = if is_closed {
        point_count
    } else {
        point_count - 1
    };
    let lines = (0..segments)
        .map(|i| [i, (i + 1) % point_count])
        .collect();
    Ok(LineSet { lines })
}

/// A polyline contour: points plus connectivity.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<Point3<f64>>,
    pub lines: LineSet,
}

impl Contour {
    /// Build a contour connecting `points` in order.
    pub fn from_points(points: Vec<Point3<f64>>, is_closed: bool) -> SsmResult<Self> {
        let lines = compute_line_indices(points.len(), is_closed)?;
        Ok(Self { points, lines })
    }

    pub fn is_closed(&self) -> bool {
        let n = self.points.len();
        n > 0 && self.lines.len() == n && self.lines.lines.last() == Some(&[n - 1, 0])
    }

    /// Sum of segment lengths.
    pub fn length(&self) -> f64 {
        self.lines
            .iter()
            .map(|&[a, b]| (self.points[b] - self.points[a]).norm())
            .sum()
    }
}

/// Write a contour as VTK XML PolyData (`.vtp`, ASCII) with line cells.
pub fn save_contour_vtp(contour: &Contour, path: &Path) -> SsmResult<()> {
    let n = contour.points.len();
    if let Some(bad) = contour.lines.iter().flatten().find(|&&i| i >= n) {
        return Err(SsmError::invalid_input(format!(
            "line references point {} but contour has {} points",
            bad, n
        )));
    }

    let file = File::create(path).map_err(|e| SsmError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    write_vtp(contour, &mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| SsmError::io_write(path, e))?;

    info!(
        points = n,
        lines = contour.lines.len(),
        "Saved contour to {:?}",
        path
    );
    Ok(())
}

fn write_vtp<W: Write>(contour: &Contour, w: &mut W) -> std::io::Result<()> {
    writeln!(w, r#"<?xml version="1.0"?>"#)?;
    writeln!(
        w,
        r#"<VTKFile type="PolyData" version="0.1" byte_order="LittleEndian">"#
    )?;
    writeln!(w, "  <PolyData>")?;
    writeln!(
        w,
        r#"    <Piece NumberOfPoints="{}" NumberOfVerts="0" NumberOfLines="{}" NumberOfStrips="0" NumberOfPolys="0">"#,
        contour.points.len(),
        contour.lines.len()
    )?;

    writeln!(w, "      <Points>")?;
    writeln!(
        w,
        r#"        <DataArray type="Float64" NumberOfComponents="3" format="ascii">"#
    )?;
    for p in &contour.points {
        writeln!(w, "          {} {} {}", p.x, p.y, p.z)?;
    }
    writeln!(w, "        </DataArray>")?;
    writeln!(w, "      </Points>")?;

    writeln!(w, "      <Lines>")?;
    writeln!(
        w,
        r#"        <DataArray type="Int64" Name="connectivity" format="ascii">"#
    )?;
    for [a, b] in contour.lines.iter() {
        writeln!(w, "          {} {}", a, b)?;
    }
    writeln!(w, "        </DataArray>")?;
    writeln!(
        w,
        r#"        <DataArray type="Int64" Name="offsets" format="ascii">"#
    )?;
    for i in 1..=contour.lines.len() {
        writeln!(w, "          {}", 2 * i)?;
    }
    writeln!(w, "        </DataArray>")?;
    writeln!(w, "      </Lines>")?;

    writeln!(w, "    </Piece>")?;
    writeln!(w, "  </PolyData>")?;
    writeln!(w, "</VTKFile>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_closed_lines_wrap_around() {
        let lines = compute_line_indices(4, true).unwrap();
        assert_eq!(lines.lines, vec![[0, 1], [1, 2], [2, 3], [3, 0]]);
    }

    #[test]
    fn test_open_lines_do_not_wrap() {
        let lines = compute_line_indices(4, false).unwrap();
        assert_eq!(lines.lines, vec![[0, 1], [1, 2], [2, 3]]);
    }

    #[test]
    fn test_single_point() {
        assert!(compute_line_indices(1, false).unwrap().is_empty());
        assert_eq!(compute_line_indices(1, true).unwrap().lines, vec![[0, 0]]);
    }

    #[test]
    fn test_zero_points_is_rejected() {
        for closed in [true, false] {
            let err = compute_line_indices(0, closed).unwrap_err();
            assert!(matches!(err, SsmError::InvalidInput { .. }));
        }
    }

    #[test]
    fn test_contour_length() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let closed = Contour::from_points(points.clone(), true).unwrap();
        assert!(closed.is_closed());
        assert!((closed.length() - 4.0).abs() < 1e-12);

        let open = Contour::from_points(points, false).unwrap();
        assert!(!open.is_closed());
        assert!((open.length() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_save_vtp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contour.vtp");
        let contour = Contour::from_points(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
            ],
            true,
        )
        .unwrap();
        save_contour_vtp(&contour, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(r#"NumberOfPoints="3""#));
        assert!(text.contains(r#"NumberOfLines="3""#));
        assert!(text.contains("          2 0\n"));
        assert!(text.contains("          6\n"));
    }

    #[test]
    fn test_save_vtp_rejects_bad_index() {
        let dir = TempDir::new().unwrap();
        let contour = Contour {
            points: vec![Point3::origin()],
            lines: LineSet {
                lines: vec![[0, 3]],
            },
        };
        let err = save_contour_vtp(&contour, &dir.path().join("bad.vtp")).unwrap_err();
        assert!(matches!(err, SsmError::InvalidInput { .. }));
    }
}
