//! Dataset helpers: file filtering, batch saving, plot grid sizing.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{SsmError, SsmResult};
use crate::io::save_mesh;
use crate::nrrd::save_volume;
use crate::{Mesh, Volume};

/// All positive divisors of `n`, ascending.
pub fn positive_factors(n: usize) -> Vec<usize> {
    (1..=n).filter(|d| n % d == 0).collect()
}

/// Rows and columns of a near-square grid holding `n` plots.
///
/// Columns are the smaller of `ceil(sqrt(n))` and `n`'s largest factor;
/// rows cover the rest.
pub fn num_subplots(n: usize) -> SsmResult<(usize, usize)> {
    if n == 0 {
        return Err(SsmError::invalid_input("cannot lay out zero subplots"));
    }
    let largest = positive_factors(n).last().copied().unwrap_or(1);
    let cols = ((n as f64).sqrt().ceil() as usize).min(largest);
    let rows = n.div_ceil(cols);
    Ok((rows, cols))
}

/// Files whose final extension equals `extension` exactly, sorted.
pub fn files_with_extension(files: &[PathBuf], extension: &str) -> Vec<PathBuf> {
    let mut matched: Vec<PathBuf> = files
        .iter()
        .filter(|f| f.extension().and_then(|e| e.to_str()) == Some(extension))
        .cloned()
        .collect();
    matched.sort();
    matched
}

fn output_paths(
    out_dir: &Path,
    names: &[String],
    count: usize,
    extension: &str,
) -> SsmResult<Vec<PathBuf>> {
    if count != names.len() {
        return Err(SsmError::invalid_input(format!(
            "{} names given for {} items",
            names.len(),
            count
        )));
    }
    let paths: Vec<PathBuf> = names
        .iter()
        .map(|name| out_dir.join(format!("{}.{}", name, extension)))
        .collect();
    for path in &paths {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SsmError::io_write(parent, e))?;
        }
    }
    Ok(paths)
}

/// Write `volumes[i]` to `<out_dir>/<names[i]>.<extension>`.
///
/// Names may contain subdirectories; missing directories are created.
/// Returns the written paths in input order.
pub fn save_volumes(
    out_dir: &Path,
    volumes: &[Volume],
    names: &[String],
    extension: &str,
) -> SsmResult<Vec<PathBuf>> {
    let paths = output_paths(out_dir, names, volumes.len(), extension)?;
    for (volume, path) in volumes.iter().zip(&paths) {
        debug!("Writing {:?}", path);
        save_volume(volume, path)?;
    }
    Ok(paths)
}

/// Write `meshes[i]` to `<out_dir>/<names[i]>.<extension>`.
pub fn save_meshes(
    out_dir: &Path,
    meshes: &[Mesh],
    names: &[String],
    extension: &str,
) -> SsmResult<Vec<PathBuf>> {
    let paths = output_paths(out_dir, names, meshes.len(), extension)?;
    for (mesh, path) in meshes.iter().zip(&paths) {
        debug!("Writing {:?}", path);
        save_mesh(mesh, path)?;
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ElementType;
    use tempfile::TempDir;

    #[test]
    fn test_positive_factors() {
        assert_eq!(positive_factors(12), vec![1, 2, 3, 4, 6, 12]);
        assert_eq!(positive_factors(7), vec![1, 7]);
        assert!(positive_factors(0).is_empty());
    }

    #[test]
    fn test_num_subplots() {
        assert_eq!(num_subplots(1).unwrap(), (1, 1));
        assert_eq!(num_subplots(7).unwrap(), (3, 3));
        assert_eq!(num_subplots(12).unwrap(), (3, 4));
        assert_eq!(num_subplots(16).unwrap(), (4, 4));
        assert!(num_subplots(0).is_err());
    }

    #[test]
    fn test_files_with_extension() {
        let files: Vec<PathBuf> = ["b.nrrd", "a.nrrd", "c.ply", "d.nrrd.gz", "e.NRRD"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(
            files_with_extension(&files, "nrrd"),
            vec![PathBuf::from("a.nrrd"), PathBuf::from("b.nrrd")]
        );
    }

    #[test]
    fn test_save_volumes_creates_directories() {
        let dir = TempDir::new().unwrap();
        let volumes = vec![
            Volume::filled([2, 2, 2], 1.0, ElementType::UChar),
            Volume::filled([3, 2, 1], 0.0, ElementType::Float),
        ];
        let names = vec!["segs/a".to_string(), "b".to_string()];
        let paths = save_volumes(dir.path(), &volumes, &names, "nrrd").unwrap();
        assert_eq!(paths[0], dir.path().join("segs/a.nrrd"));
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_save_name_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = save_meshes(dir.path(), &[Mesh::new()], &[], "ply").unwrap_err();
        assert!(matches!(err, SsmError::InvalidInput { .. }));
    }
}
