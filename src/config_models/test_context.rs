use std::path::PathBuf;

use super::cli_args::default_test_run_dir;

/// Identifies the running test, for data-directory isolation.
///
/// Usually built with [`crate::test_context!`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestContext {
    pub test_run_dir: PathBuf,

    /// Module path of the test, without the crate name, `.`-separated.
    pub test_class: String,

    pub test_name: String,

    /// Set for tests that manage their nodes themselves. The fixture then
    /// neither starts node 0 nor sets up the chain.
    pub skip_node_start: bool,
}

impl TestContext {
    /// `module_path` is what `module_path!()` yields at the test site.
    pub fn new(module_path: &str, test_name: &str) -> Self {
        Self {
            test_run_dir: default_test_run_dir(),
            test_class: test_class_from_module_path(module_path),
            test_name: test_name.to_string(),
            skip_node_start: false,
        }
    }

    pub fn with_test_run_dir(mut self, test_run_dir: PathBuf) -> Self {
        self.test_run_dir = test_run_dir;
        self
    }

    pub fn skipping_node_start(mut self) -> Self {
        self.skip_node_start = true;
        self
    }
}

fn test_class_from_module_path(module_path: &str) -> String {
    let without_crate = module_path
        .split_once("::")
        .map_or(module_path, |(_crate_name, rest)| rest);
    without_crate.replace("::", ".")
}
