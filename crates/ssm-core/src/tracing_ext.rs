//! Tracing helpers for shape-modeling operations.
//!
//! Structured events use dedicated targets so they can be filtered
//! independently:
//!
//! - `ssm_core::timing`: operation durations ([`OperationTimer`])
//! - `ssm_core::volume_state`: image dimensions and value ranges
//! - `ssm_core::mesh_state`: mesh sizes and extents
//! - `ssm_core::external`: delegated command lines
//! - `ssm_core::progress`: per-item progress through a batch
//!
//! Set `RUST_LOG=ssm_core=debug` for detailed output.

use std::time::Instant;
use tracing::{Span, debug, info, trace};

/// A performance timer that logs duration on drop.
///
/// ```rust,ignore
/// use ssm_core::tracing_ext::OperationTimer;
///
/// fn select() {
///     let _timer = OperationTimer::with_count("find_reference_mesh_index", 12);
///     // ... do work ...
/// } // logs elapsed time here
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("ssm_operation", operation = name);
        debug!(target: "ssm_core::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer that also records how many items the operation covers.
    pub fn with_count(name: &'static str, items: usize) -> Self {
        let span = tracing::info_span!("ssm_operation", operation = name, items = items);
        debug!(
            target: "ssm_core::timing",
            operation = name,
            items = items,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "ssm_core::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Operation completed"
        );
    }
}

/// Log volume dimensions, spacing and value range at debug level.
pub fn log_volume_stats(volume: &crate::Volume, context: &str) {
    let (lo, hi) = volume.value_range().unwrap_or_default();
    debug!(
        target: "ssm_core::volume_state",
        context = context,
        dims = format!("{}x{}x{}", volume.dims[0], volume.dims[1], volume.dims[2]),
        spacing = format!(
            "{:.3} x {:.3} x {:.3}",
            volume.spacing.x, volume.spacing.y, volume.spacing.z
        ),
        element_type = volume.element_type.nrrd_name(),
        min = lo,
        max = hi,
        "Volume state"
    );
}

/// Log mesh statistics at debug level.
pub fn log_mesh_stats(mesh: &crate::Mesh, context: &str) {
    let (min_bounds, max_bounds) = mesh.bounds().unwrap_or_default();
    let dims = max_bounds - min_bounds;

    debug!(
        target: "ssm_core::mesh_state",
        context = context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log a command line about to be delegated to an external tool.
pub fn log_external_command(program: &str, args: &[String]) {
    info!(
        target: "ssm_core::external",
        program = program,
        args = args.join(" "),
        "Running external tool"
    );
}

/// Log progress through a batch of items.
pub fn log_progress(operation: &str, current: usize, total: usize) {
    let percent = if total > 0 {
        (current as f64 / total as f64 * 100.0) as u32
    } else {
        0
    };

    trace!(
        target: "ssm_core::progress",
        operation = operation,
        current = current,
        total = total,
        percent = percent,
        "Progress update"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementType, Mesh, Volume};

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::with_count("test_operation", 3);
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_log_helpers_accept_empty_inputs() {
        log_mesh_stats(&Mesh::new(), "test");
        log_volume_stats(&Volume::filled([1, 1, 1], 0.0, ElementType::UChar), "test");
        log_external_command("true", &[]);
        log_progress("test", 0, 0);
    }
}
