pub mod manifest;
pub mod module_path;
pub mod version;

pub use module_path::ModulePathRules;
pub use version::ToolVersion;
