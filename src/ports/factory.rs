use crate::agents::go_execution::{GoExecutionAgent, ImageCache, RunnerSettings};
use crate::agents::{LocalFileStore, VersionControlAgent};
use crate::config::ToolConfig;
use crate::error::Result;
use crate::ports::{CommandRunner, FileStore, HostRules, StatusReader};
use std::path::Path;
use std::sync::Arc;

/// Builds the local implementations of the collaborator ports.
pub struct PortFactory;

impl PortFactory {
    pub fn create_runner(
        project_path: &Path,
        settings: RunnerSettings,
        images: Arc<ImageCache>,
    ) -> Arc<dyn CommandRunner> {
        Arc::new(GoExecutionAgent::new(project_path, settings, images))
    }

    pub fn create_status_reader(project_path: &Path) -> Result<Arc<dyn StatusReader>> {
        Ok(Arc::new(VersionControlAgent::new(project_path)?))
    }

    pub fn create_file_store(project_path: &Path) -> Result<Arc<dyn FileStore>> {
        Ok(Arc::new(LocalFileStore::new(project_path)?))
    }

    pub fn create_host_rules(config: &ToolConfig) -> Arc<dyn HostRules> {
        Arc::new(config.host_rules())
    }
}
