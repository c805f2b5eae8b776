use crate::agents::change_collector::{ChangeCollector, CollectOptions, WorkingTreeDelta};
use crate::agents::command_planner::CommandPlanner;
use crate::agents::credentials::{private_patterns, CredentialResolver};
use crate::agents::environment::{EnvironmentBuilder, EnvironmentSettings, ExecutionContext};
use crate::artifacts::{ArtifactResult, ManifestPaths, ManifestUpdateRequest, PostUpdateOption};
use crate::error::{GomodError, Result};
use crate::golang::manifest::comment_out_replace_directives;
use crate::golang::ModulePathRules;
use crate::ports::{CommandRunner, FileStore, HostRules, StatusReader};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// ArtifactUpdater regenerates go.sum, vendor/ and import paths for an
/// already updated go.mod.
pub struct ArtifactUpdater {
    runner: Arc<dyn CommandRunner>,
    status_reader: Arc<dyn StatusReader>,
    files: Arc<dyn FileStore>,
    host_rules: Arc<dyn HostRules>,
    settings: EnvironmentSettings,
    path_rules: ModulePathRules,
}

impl ArtifactUpdater {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        status_reader: Arc<dyn StatusReader>,
        files: Arc<dyn FileStore>,
        host_rules: Arc<dyn HostRules>,
        settings: EnvironmentSettings,
    ) -> Self {
        Self {
            runner,
            status_reader,
            files,
            host_rules,
            settings,
            path_rules: ModulePathRules::default(),
        }
    }

    pub fn with_module_path_rules(mut self, path_rules: ModulePathRules) -> Self {
        self.path_rules = path_rules;
        self
    }

    /// Update the artifacts belonging to `request.manifest_path`.
    ///
    /// Returns `None` when there is nothing to do, the changed files in
    /// order otherwise. Failures come back as a single error entry for the
    /// lock file.
    pub fn update_artifacts(&self, request: &ManifestUpdateRequest) -> Option<Vec<ArtifactResult>> {
        let paths = ManifestPaths::for_manifest(&request.manifest_path);
        let mut context = None;

        match self.try_update(request, &paths, &mut context) {
            Ok(results) => results,
            Err(err) => {
                let message = match &context {
                    Some(context) => context.redact(&err.to_string()),
                    None => err.to_string(),
                };
                warn!(
                    lock_file = paths.lock_file.as_str(),
                    error = message.as_str(),
                    "failed to update lock file"
                );
                Some(vec![ArtifactResult::error(paths.lock_file, message)])
            }
        }
    }

    fn try_update(
        &self,
        request: &ManifestUpdateRequest,
        paths: &ManifestPaths,
        context_slot: &mut Option<ExecutionContext>,
    ) -> Result<Option<Vec<ArtifactResult>>> {
        if self.files.read_file(&paths.lock_file)?.is_none() {
            debug!(lock_file = paths.lock_file.as_str(), "no lock file found");
            return Ok(None);
        }

        let config = &request.config;
        let vendor_mode = self.files.read_file(&paths.vendor_marker)?.is_some()
            || config.has_option(PostUpdateOption::VendorSync);

        let manifest = if config.has_option(PostUpdateOption::MassageReplaceDirectives) {
            let massaged = comment_out_replace_directives(&request.new_manifest_content);
            if massaged != request.new_manifest_content {
                debug!("commented out relative replace directives");
            }
            massaged
        } else {
            request.new_manifest_content.clone()
        };
        self.files.write_file(&paths.manifest, manifest.as_bytes())?;

        let patterns = private_patterns(&self.settings.base_env, config);
        let insertions = CredentialResolver::new(self.host_rules.as_ref()).resolve(&patterns);
        let context = context_slot
            .insert(EnvironmentBuilder::new(&self.settings).build(config, insertions));

        let plan = CommandPlanner::new(&self.path_rules).plan(request, paths, vendor_mode);
        for command in &plan.commands {
            info!(command = %command, sandbox = %context.sandbox_mode, "running toolchain command");
            let outcome = self.runner.run(command, context)?;
            if !outcome.success() {
                debug!(
                    command = %command,
                    stdout = context.redact(outcome.stdout.trim()).as_str(),
                    "command output before failure"
                );
                return Err(GomodError::Execution(format!(
                    "'{}' exited with code {}: {}",
                    command,
                    outcome.exit_code,
                    outcome.stderr.trim()
                )));
            }
            debug!(
                command = %command,
                duration_ms = outcome.duration.as_millis() as u64,
                "command finished"
            );
        }

        let delta = WorkingTreeDelta::from(self.status_reader.status()?);
        let options = CollectOptions {
            vendor_mode,
            import_paths: plan.rewrites_import_paths,
        };
        ChangeCollector::new(self.files.as_ref(), paths).collect(
            &delta,
            options,
            &request.new_manifest_content,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::command_planner::PlannedCommand;
    use crate::agents::environment::SandboxMode;
    use crate::artifacts::{DependencyRef, UpdateConfig, UpdateKind};
    use crate::ports::{ExecOutcome, HostRule, HostRuleQuery, RepoStatus};
    use std::collections::{BTreeMap, HashMap};
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<(String, BTreeMap<String, String>)>>,
        fail_with: Option<GomodError>,
        exit_code: i32,
        stderr: String,
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, command: &PlannedCommand, context: &ExecutionContext) -> Result<ExecOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), context.environment.clone()));
            if let Some(GomodError::ExecutionTimeout { program, seconds }) = &self.fail_with {
                return Err(GomodError::ExecutionTimeout {
                    program: program.clone(),
                    seconds: *seconds,
                });
            }
            Ok(ExecOutcome {
                exit_code: self.exit_code,
                stderr: self.stderr.clone(),
                ..ExecOutcome::default()
            })
        }
    }

    struct FakeStatus(RepoStatus);

    impl StatusReader for FakeStatus {
        fn status(&self) -> Result<RepoStatus> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct FakeFiles {
        files: Mutex<HashMap<String, Vec<u8>>>,
        writes: Mutex<Vec<String>>,
        fail_writes: bool,
    }

    impl FakeFiles {
        fn with(files: &[(&str, &str)]) -> Self {
            let files = files
                .iter()
                .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                .collect();
            Self {
                files: Mutex::new(files),
                ..Self::default()
            }
        }
    }

    impl FileStore for FakeFiles {
        fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.files.lock().unwrap().get(path).cloned())
        }

        fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
            if self.fail_writes {
                return Err(GomodError::Filesystem(format!("cannot write '{path}'")));
            }
            self.writes.lock().unwrap().push(path.to_string());
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), contents.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRules(HashMap<String, HostRule>);

    impl HostRules for FakeRules {
        fn find(&self, query: &HostRuleQuery) -> Option<HostRule> {
            self.0.get(&query.url).cloned()
        }
    }

    fn status(modified: &[&str], not_added: &[&str], deleted: &[&str]) -> RepoStatus {
        let owned = |v: &[&str]| -> Vec<String> { v.iter().map(|s| s.to_string()).collect() };
        RepoStatus {
            modified: owned(modified),
            not_added: owned(not_added),
            deleted: owned(deleted),
        }
    }

    fn settings(mode: SandboxMode, env: &[(&str, &str)]) -> EnvironmentSettings {
        EnvironmentSettings {
            sandbox_mode: mode,
            base_env: env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            cache_dir: PathBuf::from("/tmp/gomodup"),
            cgo_enabled: true,
        }
    }

    fn request(config: UpdateConfig) -> ManifestUpdateRequest {
        ManifestUpdateRequest {
            manifest_path: "go.mod".into(),
            updated_dependencies: vec![DependencyRef::new("github.com/foo/bar", Some("v1.5.0"))],
            new_manifest_content: "New go.mod".into(),
            config,
        }
    }

    struct Harness {
        runner: Arc<FakeRunner>,
        files: Arc<FakeFiles>,
        updater: ArtifactUpdater,
    }

    fn harness(
        runner: FakeRunner,
        files: FakeFiles,
        repo_status: RepoStatus,
        rules: FakeRules,
        settings: EnvironmentSettings,
    ) -> Harness {
        let runner = Arc::new(runner);
        let files = Arc::new(files);
        let updater = ArtifactUpdater::new(
            runner.clone(),
            Arc::new(FakeStatus(repo_status)),
            files.clone(),
            Arc::new(rules),
            settings,
        );
        Harness {
            runner,
            files,
            updater,
        }
    }

    #[test]
    fn returns_none_without_lock_file() {
        let h = harness(
            FakeRunner::default(),
            FakeFiles::with(&[("go.mod", "Current go.mod")]),
            status(&["go.sum"], &[], &[]),
            FakeRules::default(),
            settings(SandboxMode::Host, &[]),
        );

        assert!(h.updater.update_artifacts(&request(UpdateConfig::default())).is_none());
        assert!(h.files.writes.lock().unwrap().is_empty());
        assert!(h.runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn returns_none_when_nothing_changed() {
        let h = harness(
            FakeRunner::default(),
            FakeFiles::with(&[("go.sum", "Current go.sum")]),
            status(&[], &[], &[]),
            FakeRules::default(),
            settings(SandboxMode::Host, &[]),
        );

        assert!(h.updater.update_artifacts(&request(UpdateConfig::default())).is_none());
        assert_eq!(h.runner.calls.lock().unwrap().len(), 1);
        assert_eq!(h.files.writes.lock().unwrap().as_slice(), ["go.mod"]);
    }

    #[test]
    fn returns_updated_lock_file() {
        let h = harness(
            FakeRunner::default(),
            FakeFiles::with(&[("go.sum", "New lock")]),
            status(&["go.sum"], &[], &[]),
            FakeRules::default(),
            settings(SandboxMode::Host, &[]),
        );

        let results = h.updater.update_artifacts(&request(UpdateConfig::default())).unwrap();
        assert_eq!(results, vec![ArtifactResult::file("go.sum", "New lock")]);
    }

    #[test]
    fn vendor_mode_returns_vendor_changes_in_order() {
        let h = harness(
            FakeRunner::default(),
            FakeFiles::with(&[
                ("go.sum", "sum"),
                ("vendor/modules.txt", "# github.com/foo/bar v1.5.0"),
                ("vendor/a.go", "A"),
                ("vendor/b.go", "B"),
            ]),
            status(&["go.sum", "vendor/a.go"], &["vendor/b.go"], &["vendor/c.go"]),
            FakeRules::default(),
            settings(SandboxMode::Host, &[]),
        );

        let results = h.updater.update_artifacts(&request(UpdateConfig::default())).unwrap();
        assert_eq!(
            results,
            vec![
                ArtifactResult::file("go.sum", "sum"),
                ArtifactResult::file("vendor/a.go", "A"),
                ArtifactResult::file("vendor/b.go", "B"),
                ArtifactResult::deleted("vendor/c.go"),
            ]
        );
        let calls = h.runner.calls.lock().unwrap();
        let commands: Vec<&str> = calls.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(commands, ["go get -d -t ./...", "go mod vendor"]);
    }

    #[test]
    fn container_mode_injects_private_host_token() {
        let mut rules = HashMap::new();
        rules.insert(
            "https://github.com/corp".to_string(),
            HostRule {
                token: Some("some-token".into()),
                ..HostRule::default()
            },
        );
        let h = harness(
            FakeRunner::default(),
            FakeFiles::with(&[("go.sum", "sum")]),
            status(&["go.sum"], &[], &[]),
            FakeRules(rules),
            settings(
                SandboxMode::Container,
                &[("GOPRIVATE", "github.com/corp,github.com/corp"), ("GIT_CONFIG_COUNT", "x")],
            ),
        );

        let results = h.updater.update_artifacts(&request(UpdateConfig::default())).unwrap();
        assert_eq!(results.len(), 1);

        let calls = h.runner.calls.lock().unwrap();
        let env = &calls[0].1;
        assert_eq!(env["GIT_CONFIG_COUNT"], "1");
        assert_eq!(env["GIT_CONFIG_KEY_0"], "url.https://some-token@github.com/corp/.insteadOf");
        assert_eq!(env["GIT_CONFIG_VALUE_0"], "https://github.com/corp/");
        assert_eq!(env["GONOSUMDB"], "github.com/corp,github.com/corp");
    }

    #[test]
    fn returns_rewritten_sources_after_import_path_update() {
        let config = UpdateConfig {
            post_update_options: PostUpdateOption::parse_set(["updateImportPaths"]),
            update_kind: UpdateKind::Major,
            new_major_version: Some(2),
            ..UpdateConfig::default()
        };
        let mut req = request(config);
        req.updated_dependencies = vec![DependencyRef::new("github.com/foo/bar", Some("v2.0.0"))];

        let files = FakeFiles::with(&[("go.sum", "sum"), ("main.go", "import bar/v2")]);
        let h = harness(
            FakeRunner::default(),
            files,
            status(&["go.sum", "main.go", "go.mod"], &[], &[]),
            FakeRules::default(),
            settings(SandboxMode::Host, &[]),
        );
        let results = h.updater.update_artifacts(&req).unwrap();

        assert_eq!(results[0], ArtifactResult::file("go.sum", "sum"));
        assert_eq!(results[1], ArtifactResult::file("main.go", "import bar/v2"));
        // go.mod on disk still matches the request
        assert_eq!(results.len(), 2);
        let calls = h.runner.calls.lock().unwrap();
        assert!(calls[1].0.contains("--mod-name=github.com/foo/bar -t=2"));
    }

    #[test]
    fn massaged_manifest_is_restored_before_comparison() {
        let config = UpdateConfig {
            post_update_options: PostUpdateOption::parse_set(["gomodMassage"]),
            ..UpdateConfig::default()
        };
        let mut req = request(config);
        req.new_manifest_content = "module a\nreplace x => ../x\n".into();

        let h = harness(
            FakeRunner::default(),
            FakeFiles::with(&[("go.sum", "sum")]),
            status(&["go.sum"], &[], &[]),
            FakeRules::default(),
            settings(SandboxMode::Host, &[]),
        );

        let results = h.updater.update_artifacts(&req).unwrap();
        assert_eq!(results, vec![ArtifactResult::file("go.sum", "sum")]);
        let written = h.files.files.lock().unwrap()["go.mod"].clone();
        assert_eq!(
            String::from_utf8(written).unwrap(),
            "module a\n// gomodup-replace replace x => ../x\n"
        );
    }

    #[test]
    fn write_failure_becomes_artifact_error() {
        let files = FakeFiles {
            fail_writes: true,
            ..FakeFiles::with(&[("go.sum", "sum")])
        };
        let h = harness(
            FakeRunner::default(),
            files,
            status(&["go.sum"], &[], &[]),
            FakeRules::default(),
            settings(SandboxMode::Host, &[]),
        );

        let results = h.updater.update_artifacts(&request(UpdateConfig::default())).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error());
        assert_eq!(results[0].path(), "go.sum");
        assert!(h.runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn non_zero_exit_becomes_redacted_artifact_error() {
        let mut rules = HashMap::new();
        rules.insert(
            "https://gitlab.example.com".to_string(),
            HostRule {
                token: Some("glpat-secret".into()),
                ..HostRule::default()
            },
        );
        let runner = FakeRunner {
            exit_code: 1,
            stderr: "fatal: could not read https://glpat-secret@gitlab.example.com/".into(),
            ..FakeRunner::default()
        };
        let h = harness(
            runner,
            FakeFiles::with(&[("go.sum", "sum")]),
            status(&["go.sum"], &[], &[]),
            FakeRules(rules),
            settings(SandboxMode::Host, &[("GOPRIVATE", "gitlab.example.com")]),
        );

        let results = h.updater.update_artifacts(&request(UpdateConfig::default())).unwrap();
        match &results[..] {
            [ArtifactResult::Error(err)] => {
                assert_eq!(err.path, "go.sum");
                assert!(err.message.contains("exited with code 1"));
                assert!(!err.message.contains("glpat-secret"));
            }
            other => panic!("unexpected results: {other:?}"),
        }
    }

    #[test]
    fn engine_timeout_becomes_artifact_error() {
        let runner = FakeRunner {
            fail_with: Some(GomodError::ExecutionTimeout {
                program: "go".into(),
                seconds: 10,
            }),
            ..FakeRunner::default()
        };
        let h = harness(
            runner,
            FakeFiles::with(&[("go.sum", "sum")]),
            status(&["go.sum"], &[], &[]),
            FakeRules::default(),
            settings(SandboxMode::Host, &[]),
        );

        let results = h.updater.update_artifacts(&request(UpdateConfig::default())).unwrap();
        assert_eq!(
            results,
            vec![ArtifactResult::error("go.sum", "Command 'go' timed out after 10s")]
        );
    }

    #[test]
    fn request_is_not_mutated() {
        let h = harness(
            FakeRunner::default(),
            FakeFiles::with(&[("go.sum", "sum")]),
            status(&["go.sum"], &[], &[]),
            FakeRules::default(),
            settings(SandboxMode::Host, &[]),
        );
        let req = request(UpdateConfig::default());
        let before = format!("{req:?}");
        h.updater.update_artifacts(&req);
        assert_eq!(format!("{req:?}"), before);
    }
}
