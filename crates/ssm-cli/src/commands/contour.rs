//! ssm contour command - connect a point list into a contour.

use std::path::Path;

use anyhow::{Context, Result, bail};
use nalgebra::Point3;
use serde::Serialize;
use ssm_core::{Contour, save_contour_vtp};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct ContourResult {
    input: String,
    output: String,
    points: usize,
    lines: usize,
    closed: bool,
    length: f64,
}

/// Parse one point per line, comma or whitespace separated.
///
/// Blank lines and lines starting with `#` are skipped.
fn parse_points(text: &str) -> Result<Vec<Point3<f64>>> {
    let mut points = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let coords = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("line {}: invalid number", lineno + 1))?;
        if coords.len() != 3 {
            bail!(
                "line {}: expected 3 coordinates, found {}",
                lineno + 1,
                coords.len()
            );
        }
        points.push(Point3::new(coords[0], coords[1], coords[2]));
    }
    Ok(points)
}

pub fn run(input: &Path, output_path: &Path, open: bool, cli: &Cli) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read points from {:?}", input))?;
    let points = parse_points(&text).with_context(|| format!("Malformed point file {:?}", input))?;

    let contour = Contour::from_points(points, !open)?;
    save_contour_vtp(&contour, output_path)
        .with_context(|| format!("Failed to write contour to {:?}", output_path))?;

    let result = ContourResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        points: contour.points.len(),
        lines: contour.lines.len(),
        closed: contour.is_closed(),
        length: contour.length(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            output::success(
                &format!(
                    "Wrote {} contour ({} points, {} lines, length {:.2}) to {}",
                    if result.closed { "closed" } else { "open" },
                    result.points,
                    result.lines,
                    result.length,
                    result.output
                ),
                cli.format,
                cli.quiet,
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_and_whitespace() {
        let points = parse_points("0,0,0\n1 0 0\n# comment\n\n1, 1, 0\n").unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[2], Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_parse_wrong_arity() {
        let err = parse_points("0,0\n").unwrap_err();
        assert!(err.to_string().contains("expected 3 coordinates"));
    }

    #[test]
    fn test_parse_bad_number() {
        assert!(parse_points("0,zero,0\n").is_err());
    }
}
