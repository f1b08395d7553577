//! Pipeline configuration.
//!
//! Defaults come from [`CompilerConfig::default`]; the `KILN_*` environment
//! variables override individual settings:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `KILN_EA` | escape analysis on/off |
//! | `KILN_EA_ITERATIONS` | loop iteration cap |
//! | `KILN_EA_MAX_ARRAY` | longest virtualized array |
//! | `KILN_CANONICALIZE` | canonicalization on/off |
//! | `KILN_VERIFY_GRAPH` | graph verification between phases |

use std::str::FromStr;

use kiln_ea::EscapeAnalysisConfig;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompilerConfig {
    pub escape_analysis: EscapeAnalysisConfig,
    /// Canonicalize before and after escape analysis.
    pub canonicalize: bool,
    /// Run `Graph::verify` on entry and after every graph phase.
    pub verify_graph: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            escape_analysis: EscapeAnalysisConfig::default(),
            canonicalize: true,
            verify_graph: true,
        }
    }
}

impl CompilerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `KILN_*` overrides read through `lookup`. Values that do not
    /// parse are ignored with a warning.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ea = &mut self.escape_analysis;
        override_with(&lookup, "KILN_EA", parse_flag, &mut ea.enabled);
        override_with(&lookup, "KILN_EA_ITERATIONS", parse_number, &mut ea.max_loop_iterations);
        override_with(&lookup, "KILN_EA_MAX_ARRAY", parse_number, &mut ea.max_virtual_array_length);
        override_with(&lookup, "KILN_CANONICALIZE", parse_flag, &mut self.canonicalize);
        override_with(&lookup, "KILN_VERIFY_GRAPH", parse_flag, &mut self.verify_graph);
        self
    }

    #[must_use]
    pub fn with_escape_analysis(mut self, enabled: bool) -> Self {
        self.escape_analysis.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_max_loop_iterations(mut self, iterations: u32) -> Self {
        self.escape_analysis.max_loop_iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_max_virtual_array_length(mut self, length: u32) -> Self {
        self.escape_analysis.max_virtual_array_length = length;
        self
    }

    #[must_use]
    pub fn with_canonicalize(mut self, canonicalize: bool) -> Self {
        self.canonicalize = canonicalize;
        self
    }

    #[must_use]
    pub fn with_verify_graph(mut self, verify: bool) -> Self {
        self.verify_graph = verify;
        self
    }
}

fn override_with<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: fn(&str) -> Option<T>,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match parse(raw.trim()) {
        Some(value) => *target = value,
        None => warn!(key, value = %raw, "ignoring invalid configuration value"),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn parse_number<T: FromStr>(raw: &str) -> Option<T> {
    raw.parse().ok()
}
