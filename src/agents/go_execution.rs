use crate::agents::command_planner::PlannedCommand;
use crate::agents::environment::{ExecutionContext, SandboxMode};
use crate::error::{GomodError, Result};
use crate::golang::version::image_tag;
use crate::ports::{CommandRunner, ExecOutcome};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashSet;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique per process and call, so a timed-out container can be removed.
fn container_name() -> String {
    format!(
        "gomodup-{}-{}",
        std::process::id(),
        CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Container images already pulled in this session.
#[derive(Debug, Default)]
pub struct ImageCache {
    images: Mutex<HashSet<String>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every image. Called once at the start of a work session.
    pub fn reset(&self) {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn is_prefetched(&self, image: &str) -> bool {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(image)
    }

    /// Returns `false` if the image was already recorded.
    pub fn mark_prefetched(&self, image: &str) -> bool {
        self.images
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(image.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Directory holding the `go` binary in installed mode.
    pub toolchain_dir: Option<PathBuf>,
    pub go_image: String,
    pub docker_binary: String,
    pub timeout: Option<Duration>,
    pub show_progress: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            toolchain_dir: None,
            go_image: "golang".to_string(),
            docker_binary: "docker".to_string(),
            timeout: None,
            show_progress: false,
        }
    }
}

/// GoExecutionAgent runs planned toolchain commands on the host, with an
/// installed toolchain, or inside a throwaway container.
pub struct GoExecutionAgent {
    project_path: PathBuf,
    settings: RunnerSettings,
    images: Arc<ImageCache>,
}

impl GoExecutionAgent {
    pub fn new<P: AsRef<Path>>(project_path: P, settings: RunnerSettings, images: Arc<ImageCache>) -> Self {
        Self {
            project_path: project_path.as_ref().to_path_buf(),
            settings,
            images,
        }
    }

    /// The process to spawn, plus the container name in container mode.
    fn build_process(
        &self,
        command: &PlannedCommand,
        context: &ExecutionContext,
    ) -> Result<(Command, Option<String>)> {
        let cwd = self.project_path.join(&command.working_dir);

        let process = match context.sandbox_mode {
            SandboxMode::Host => {
                let mut process = Command::new(&command.program);
                process
                    .env_clear()
                    .envs(&context.environment)
                    .current_dir(&cwd)
                    .args(&command.args);
                process
            }
            SandboxMode::Installed => {
                let (program, path) = self.installed_program(command, context);
                let mut process = Command::new(program);
                process.env_clear().envs(&context.environment);
                if let Some(path) = path {
                    process.env("PATH", path);
                }
                process.current_dir(&cwd).args(&command.args);
                process
            }
            SandboxMode::Container => {
                let image = self.container_image(context);
                self.prefetch_image(&image)?;
                let name = container_name();
                let mut process = Command::new(&self.settings.docker_binary);
                // values reach docker through its own environment, never argv
                process
                    .envs(&context.environment)
                    .args(self.docker_args(command, context, &image, &name));
                return Ok((process, Some(name)));
            }
        };

        Ok((process, None))
    }

    fn installed_program(
        &self,
        command: &PlannedCommand,
        context: &ExecutionContext,
    ) -> (PathBuf, Option<OsString>) {
        let Some(dir) = &self.settings.toolchain_dir else {
            return (PathBuf::from(&command.program), None);
        };

        let mut entries = vec![dir.clone()];
        if let Some(path) = context.environment.get("PATH") {
            entries.extend(std::env::split_paths(path));
        }
        let path = std::env::join_paths(entries).ok();
        (dir.join(&command.program), path)
    }

    fn container_image(&self, context: &ExecutionContext) -> String {
        format!(
            "{}:{}",
            self.settings.go_image,
            image_tag(context.toolchain_constraint.as_deref())
        )
    }

    pub fn docker_args(
        &self,
        command: &PlannedCommand,
        context: &ExecutionContext,
        image: &str,
        name: &str,
    ) -> Vec<String> {
        let root = self.project_path.to_string_lossy().into_owned();
        let cwd = self
            .project_path
            .join(&command.working_dir)
            .to_string_lossy()
            .into_owned();

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "-v".to_string(),
            format!("{root}:{root}"),
        ];
        if let Some(gopath) = context.environment.get("GOPATH") {
            args.push("-v".to_string());
            args.push(format!("{gopath}:{gopath}"));
        }
        args.push("-w".to_string());
        args.push(cwd);
        for name in context.environment.keys() {
            args.push("-e".to_string());
            args.push(name.clone());
        }
        args.push(image.to_string());
        args.push(command.program.clone());
        args.extend(command.args.iter().cloned());
        args
    }

    fn prefetch_image(&self, image: &str) -> Result<()> {
        if self.images.is_prefetched(image) {
            return Ok(());
        }

        info!(image, "pulling toolchain image");
        let output = Command::new(&self.settings.docker_binary)
            .args(["pull", image])
            .output()
            .map_err(|e| GomodError::Execution(format!("Failed to run docker pull: {e}")))?;
        if !output.status.success() {
            return Err(GomodError::Execution(format!(
                "docker pull {image} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        self.images.mark_prefetched(image);
        Ok(())
    }

    fn remove_container(&self, name: &str) {
        let removed = Command::new(&self.settings.docker_binary)
            .args(["rm", "-f", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match removed {
            Ok(status) if status.success() => debug!(container = name, "removed container"),
            Ok(status) => warn!(container = name, code = ?status.code(), "docker rm failed"),
            Err(e) => warn!(container = name, error = %e, "failed to run docker rm"),
        }
    }

    fn ensure_gopath(context: &ExecutionContext) -> Result<()> {
        if let Some(gopath) = context.environment.get("GOPATH") {
            std::fs::create_dir_all(gopath).map_err(|e| {
                GomodError::Filesystem(format!("Failed to create GOPATH '{gopath}': {e}"))
            })?;
        }
        Ok(())
    }

    fn spinner(&self, label: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if !self.settings.show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(label.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Run a process to completion, enforcing the configured timeout.
    fn execute(
        &self,
        mut process: Command,
        container: Option<&str>,
        program: &str,
        label: &str,
    ) -> Result<ExecOutcome> {
        let pb = self.spinner(label);
        let started = Instant::now();

        let mut child = process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GomodError::Execution(format!("Failed to spawn '{label}': {e}")))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            let polled = child
                .try_wait()
                .map_err(|e| GomodError::Execution(format!("Failed to wait for '{label}': {e}")))?;
            if let Some(status) = polled {
                break status;
            }
            if let Some(timeout) = self.settings.timeout {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    // killing the client leaves the container running
                    if let Some(name) = container {
                        self.remove_container(name);
                    }
                    pb.finish_and_clear();
                    return Err(GomodError::ExecutionTimeout {
                        program: program.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        };
        pb.finish_and_clear();

        let outcome = ExecOutcome {
            exit_code: status.code().unwrap_or(-1),
            duration: started.elapsed(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        debug!(command = label, exit_code = outcome.exit_code, "process exited");
        Ok(outcome)
    }
}

impl CommandRunner for GoExecutionAgent {
    fn run(&self, command: &PlannedCommand, context: &ExecutionContext) -> Result<ExecOutcome> {
        Self::ensure_gopath(context)?;
        let (process, container) = self.build_process(command, context)?;
        self.execute(
            process,
            container.as_deref(),
            &command.program,
            &command.to_string(),
        )
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
