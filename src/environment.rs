//! Run-scoped configuration handed to providers' `prepare`/check
//! callbacks: output location, format, and verbosity. Plain data, so
//! there is nothing to release at teardown beyond dropping it (§5
//! "Resource lifecycle").

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

#[derive(Debug, Clone)]
pub struct Environment {
    pub output_dir: PathBuf,
    pub formats: Vec<String>,
    pub style: Option<PathBuf>,
    pub verbosity: Verbosity,
    pub parallel: bool,
}

impl Environment {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            formats: Vec::new(),
            style: None,
            verbosity: Verbosity::Normal,
            parallel: false,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new("output")
    }
}
