/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! Wraps the `log` crate with the verbosity levels and "all nodes vs.
//! rank 0" filter `original_source/src/ice-t/diagnostics.c` provides
//! natively. spec.md §7 "a diagnostic is logged at the configured
//! verbosity (errors / warnings / debug, optionally on all nodes)".

/// Diagnostic verbosity, ordered from least to most chatty. A message is
/// emitted when its own level is `<=` the configured level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Errors,
    Warnings,
    Debug,
}

/// Per-context diagnostic configuration.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostics {
    level: Verbosity,
    all_nodes: bool,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            level: Verbosity::Errors,
            all_nodes: false,
        }
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn set_level(&mut self, level: Verbosity) {
        self.level = level;
    }

    pub fn set_all_nodes(&mut self, all_nodes: bool) {
        self.all_nodes = all_nodes;
    }

    /// Logs `message` at `level`, prefixed with the reporting rank the
    /// way `IceTDevDiagnostics` always does, subject to this context's
    /// configured verbosity and node filter.
    pub fn report(&self, rank: i32, level: Verbosity, message: &str) {
        if level > self.level {
            return;
        }
        if !self.all_nodes && rank != 0 {
            return;
        }
        match level {
            Verbosity::Errors => log::error!("[rank {rank}] {message}"),
            Verbosity::Warnings => log::warn!("[rank {rank}] {message}"),
            Verbosity::Debug => log::debug!("[rank {rank}] {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_outrank_debug() {
        assert!(Verbosity::Errors < Verbosity::Warnings);
        assert!(Verbosity::Warnings < Verbosity::Debug);
    }
}
