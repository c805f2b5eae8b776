use crate::artifacts::{ManifestPaths, ManifestUpdateRequest, PostUpdateOption, UpdateKind};
use crate::golang::{ModulePathRules, ToolVersion};
use std::fmt;
use tracing::debug;

pub const GO_PROGRAM: &str = "go";
/// Import path rewrite tool and the constraint key selecting its version.
pub const MOD_TOOL: &str = "github.com/marwan-at-work/mod/cmd/mod";
pub const MOD_TOOL_CONSTRAINT: &str = "gomodMod";

/// A toolchain invocation. `working_dir` is repository-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: String,
}

impl PlannedCommand {
    fn go<I, S>(args: I, working_dir: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: GO_PROGRAM.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: working_dir.to_string(),
        }
    }
}

impl fmt::Display for PlannedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandPlan {
    pub commands: Vec<PlannedCommand>,
    /// Whether import path rewrite commands were planned.
    pub rewrites_import_paths: bool,
}

/// Decides which toolchain commands an update needs, in execution order.
pub struct CommandPlanner<'a> {
    path_rules: &'a ModulePathRules,
}

impl<'a> CommandPlanner<'a> {
    pub fn new(path_rules: &'a ModulePathRules) -> Self {
        Self { path_rules }
    }

    pub fn plan(
        &self,
        request: &ManifestUpdateRequest,
        paths: &ManifestPaths,
        vendor_mode: bool,
    ) -> CommandPlan {
        let config = &request.config;
        let dir = paths.directory.as_str();
        let mut commands = vec![PlannedCommand::go(["get", "-d", "-t", "./..."], dir)];

        if vendor_mode {
            commands.push(PlannedCommand::go(["mod", "vendor"], dir));
        }

        if config.wants_tidy() {
            let mut args = vec!["mod".to_string(), "tidy".to_string()];
            if config.has_option(PostUpdateOption::TidyCompat117) {
                args.push("-compat=1.17".to_string());
            }
            commands.push(PlannedCommand::go(args, dir));

            // the vendor tree has to follow the tidied module graph
            if vendor_mode {
                commands.push(PlannedCommand::go(["mod", "vendor"], dir));
            }
        }

        let rewrites = self.import_path_rewrites(request, dir);
        let rewrites_import_paths = !rewrites.is_empty();
        commands.extend(rewrites);

        debug!(
            commands = ?commands.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "planned toolchain commands"
        );

        CommandPlan {
            commands,
            rewrites_import_paths,
        }
    }

    fn import_path_rewrites(&self, request: &ManifestUpdateRequest, dir: &str) -> Vec<PlannedCommand> {
        let config = &request.config;
        if !config.has_option(PostUpdateOption::UpdateImportPaths) || config.update_kind != UpdateKind::Major {
            return Vec::new();
        }
        let Some(major) = config.new_major_version.filter(|major| *major > 1) else {
            debug!("import path update skipped, new major is not above v1");
            return Vec::new();
        };

        let tool_version = ToolVersion::from_constraint(config.constraint(MOD_TOOL_CONSTRAINT));
        if tool_version.is_latest() {
            debug!(tool = MOD_TOOL, "no pinned version, using latest");
        }

        request
            .updated_dependencies
            .iter()
            .filter(|dep| {
                let eligible = self.path_rules.is_rewrite_eligible(
                    &dep.module_path,
                    dep.new_version.as_deref(),
                    major,
                );
                if !eligible {
                    debug!(module = dep.module_path.as_str(), "import path update not applicable");
                }
                eligible
            })
            .map(|dep| {
                PlannedCommand::go(
                    [
                        "run".to_string(),
                        format!("{MOD_TOOL}@{tool_version}"),
                        "upgrade".to_string(),
                        format!("--mod-name={}", dep.module_path),
                        format!("-t={major}"),
                    ],
                    dir,
                )
            })
            .collect()
    }
}
