use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use super::test_context::TestContext;

/// Deepest path bitcoind creates below its data directory, which is what
/// breaks first on path-length-sensitive filesystems.
pub const BITCOIND_INTERNAL_PATH: &str = "regtest/blocks/index/MANIFEST-00000";

/// Length reserved for bitcoind's own layout, with some slack for the
/// manifest number growing.
pub const BITCOIND_INTERNAL_PATH_LENGTH: usize = BITCOIND_INTERNAL_PATH.len() + 10;

/// `MAX_PATH` on Windows.
pub const MAX_PATH_LENGTH: usize = 260;

/// The ceiling that applies when none is configured.
pub fn platform_path_length_ceiling() -> Option<usize> {
    cfg!(windows).then_some(MAX_PATH_LENGTH)
}

/// The data directory of one node for one test:
/// `<test run dir>/node<index>/<test class>/<test name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataDirectory {
    data_dir: PathBuf,
}

impl DataDirectory {
    pub fn for_node(context: &TestContext, index: usize) -> Self {
        let data_dir = context
            .test_run_dir
            .join(format!("node{index}"))
            .join(&context.test_class)
            .join(&context.test_name);

        Self { data_dir }
    }

    pub fn root_dir_path(&self) -> PathBuf {
        self.data_dir.clone()
    }

    pub fn as_path(&self) -> &Path {
        &self.data_dir
    }

    /// Length of the longest path the node will create below this
    /// directory.
    pub fn full_path_length(&self) -> usize {
        self.data_dir.to_string_lossy().chars().count() + BITCOIND_INTERNAL_PATH_LENGTH
    }

    /// `true` if the node's deepest path would reach `ceiling`.
    pub fn exceeds(&self, ceiling: usize) -> bool {
        self.full_path_length() >= ceiling
    }

    /// Removes whatever an earlier run left behind and creates the
    /// directory afresh.
    pub async fn recreate(&self) -> std::io::Result<()> {
        if tokio::fs::try_exists(&self.data_dir).await? {
            debug!("removing stale data directory {}", self);
            tokio::fs::remove_dir_all(&self.data_dir).await?;
        }
        tokio::fs::create_dir_all(&self.data_dir).await
    }
}

impl std::fmt::Display for DataDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.data_dir.display())
    }
}
