use crate::agents::command_planner::PlannedCommand;
use crate::agents::environment::ExecutionContext;
use crate::error::Result;
use std::time::Duration;

pub mod factory;
pub use factory::PortFactory;

/// Outcome of one command run by the execution engine.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Working-tree status as reported by version control.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoStatus {
    pub modified: Vec<String>,
    pub not_added: Vec<String>,
    pub deleted: Vec<String>,
}

impl RepoStatus {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.not_added.is_empty() && self.deleted.is_empty()
    }
}

/// Credentials registered for a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRule {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRuleQuery {
    pub host_type: String,
    pub url: String,
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &PlannedCommand, context: &ExecutionContext) -> Result<ExecOutcome>;
}

pub trait StatusReader: Send + Sync {
    fn status(&self) -> Result<RepoStatus>;
}

/// Repository-relative file access.
pub trait FileStore: Send + Sync {
    /// Returns `None` when the file does not exist.
    fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>>;

    fn write_file(&self, path: &str, contents: &[u8]) -> Result<()>;
}

pub trait HostRules: Send + Sync {
    fn find(&self, query: &HostRuleQuery) -> Option<HostRule>;
}
