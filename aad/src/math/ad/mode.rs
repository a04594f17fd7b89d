use std::cell::Cell;

use tracing::debug;

use crate::utils::errors::{AadError, Result};

/// Number of adjoints carried per node and whether nodes get per-output slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputMode {
    multi: bool,
    outputs: usize,
}

impl OutputMode {
    pub const SINGLE: OutputMode = OutputMode {
        multi: false,
        outputs: 1,
    };

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::SINGLE
    }
}

thread_local! {
    static MODE: Cell<OutputMode> = const { Cell::new(OutputMode::SINGLE) };
}

/// Output mode nodes are recorded with on this thread.
pub fn output_mode() -> OutputMode {
    MODE.with(|m| m.get())
}

/// Restores single-output mode when dropped.
#[must_use = "the output mode is reset as soon as the guard is dropped"]
#[derive(Debug)]
pub struct OutputModeGuard {
    _private: (),
}

impl Drop for OutputModeGuard {
    fn drop(&mut self) {
        MODE.with(|m| m.set(OutputMode::SINGLE));
        debug!("output mode reset to single");
    }
}

/// Configure how many adjoints subsequently recorded nodes carry. The
/// configuration lasts as long as the returned guard.
///
/// With `multi == false` the count is forced to 1. Asking for zero outputs
/// is rejected.
pub fn set_num_outputs(multi: bool, outputs: usize) -> Result<OutputModeGuard> {
    if outputs == 0 {
        return Err(AadError::InvalidConfiguration(
            "at least one output is required".to_string(),
        ));
    }
    let mode = if multi {
        OutputMode { multi, outputs }
    } else {
        OutputMode::SINGLE
    };
    MODE.with(|m| m.set(mode));
    debug!(multi, outputs = mode.outputs, "output mode configured");
    Ok(OutputModeGuard { _private: () })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_single_mode() {
        {
            let _guard = set_num_outputs(true, 3).unwrap();
            assert!(output_mode().is_multi());
            assert_eq!(output_mode().outputs(), 3);
        }
        assert_eq!(output_mode(), OutputMode::SINGLE);
    }

    #[test]
    fn test_zero_outputs_rejected() {
        assert!(set_num_outputs(true, 0).is_err());
        assert_eq!(output_mode(), OutputMode::SINGLE);
    }

    #[test]
    fn test_single_forces_one_output() {
        let _guard = set_num_outputs(false, 5).unwrap();
        assert_eq!(output_mode().outputs(), 1);
        assert!(!output_mode().is_multi());
    }
}
