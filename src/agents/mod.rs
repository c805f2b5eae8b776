pub mod artifact_updater;
pub mod change_collector;
pub mod command_planner;
pub mod credentials;
pub mod environment;
pub mod file_store;
pub mod go_execution;
pub mod version_control;

pub use artifact_updater::ArtifactUpdater;
pub use file_store::LocalFileStore;
pub use go_execution::ImageCache;
pub use version_control::VersionControlAgent;
