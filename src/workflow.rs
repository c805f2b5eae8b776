use crate::agents::{ArtifactUpdater, ImageCache};
use crate::artifacts::{
    ArtifactResult, DependencyRef, ManifestUpdateRequest, PostUpdateOption, UpdateConfig,
    UpdateKind,
};
use crate::config::ToolConfig;
use crate::ports::{PortFactory, RepoStatus};
use crate::utils::path_validator::PathValidator;
use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Arguments of the `update` subcommand.
#[derive(Debug, Clone, Default)]
pub struct UpdateArgs {
    pub manifest: String,
    pub deps: Vec<String>,
    pub update_type: Option<String>,
    pub new_major: Option<u64>,
    pub options: Vec<String>,
    pub binary_source: Option<String>,
    pub json: bool,
}

/// Execute the update workflow. Returns `true` when the result is an
/// artifact error.
pub fn execute_update(
    project_path: &Path,
    config_path: Option<&Path>,
    args: UpdateArgs,
) -> Result<bool> {
    let json = args.json;
    let say = |line: String| {
        if json {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    };

    say(format!("{}", "Regenerating Go module artifacts...".cyan().bold()));

    // Step 1: Validate project and load configuration
    say(format!("\n{}", "1. Loading configuration...".yellow()));
    let project_path = PathValidator::validate_project_path(project_path)
        .context("Failed to open the repository")?;
    let process_env: BTreeMap<String, String> = std::env::vars().collect();
    let mut config = ToolConfig::load(&project_path, config_path)
        .context("Failed to load gomodup configuration")?;
    config.apply_env_overrides(&process_env);
    if args.binary_source.is_some() {
        config.binary_source = args.binary_source.clone();
    }
    say(format!(
        "   Go source: {}, cache: {}",
        config.sandbox_mode().to_string().bright_cyan(),
        config.cache_dir().display().to_string().dimmed()
    ));

    let files = PortFactory::create_file_store(&project_path)?;
    let status_reader = PortFactory::create_status_reader(&project_path)?;

    // Step 2: Inspect the working tree
    say(format!("\n{}", "2. Checking Git status...".yellow()));
    let status = status_reader
        .status()
        .context("Failed to read the working tree status")?;
    let unrelated = unrelated_changes(&status, &args.manifest);
    if unrelated > 0 {
        say(format!(
            "{}",
            format!(
                "⚠ Warning: {unrelated} other changed file(s) may be reported as artifacts"
            )
            .red()
        ));
    } else {
        say(format!("{}", "✓ Only the manifest has changed".green()));
    }

    // Step 3: Build the request from the manifest on disk
    say(format!("\n{}", "3. Reading manifest...".yellow()));
    let manifest = files
        .read_file(&args.manifest)?
        .with_context(|| format!("Manifest '{}' does not exist", args.manifest))?;
    let request = ManifestUpdateRequest {
        manifest_path: args.manifest.clone(),
        updated_dependencies: parse_dependencies(&args.deps)?,
        new_manifest_content: String::from_utf8(manifest)
            .with_context(|| format!("Manifest '{}' is not valid UTF-8", args.manifest))?,
        config: merge_update_config(config.update_config(), &args)?,
    };
    say(format!(
        "   {} updated dependencies, options: {}",
        request.updated_dependencies.len(),
        describe_options(&request.config)
    ));

    // Step 4: Run the updater
    say(format!("\n{}", "4. Updating artifacts...".yellow()));
    let images = Arc::new(ImageCache::new());
    images.reset();
    let runner = PortFactory::create_runner(&project_path, config.runner_settings(!json), images);
    let updater = ArtifactUpdater::new(
        runner,
        status_reader,
        files,
        PortFactory::create_host_rules(&config),
        config.environment_settings(process_env),
    )
    .with_module_path_rules(config.module_path_rules());
    let results = updater.update_artifacts(&request);
    let failed = results
        .as_ref()
        .is_some_and(|results| results.iter().any(ArtifactResult::is_error));

    // Step 5: Report
    if json {
        let body = serde_json::to_string_pretty(&results.unwrap_or_default())
            .context("Failed to serialise artifact results")?;
        println!("{body}");
    } else {
        print_results(results.as_deref());
    }

    Ok(failed)
}

/// Print the files git reports as changed.
pub fn execute_status(project_path: &Path) -> Result<()> {
    let project_path = PathValidator::validate_project_path(project_path)
        .context("Failed to open the repository")?;
    let reader = PortFactory::create_status_reader(&project_path)?;
    let status = reader
        .status()
        .context("Failed to read the working tree status")?;

    if status.is_empty() {
        println!("{}", "✨ Working tree is clean".green().bold());
        return Ok(());
    }

    print_paths("Modified", &status.modified, |p| p.yellow().to_string());
    print_paths("Not added", &status.not_added, |p| p.green().to_string());
    print_paths("Deleted", &status.deleted, |p| p.red().to_string());
    Ok(())
}

fn print_paths(title: &str, paths: &[String], paint: impl Fn(&str) -> String) {
    if paths.is_empty() {
        return;
    }
    println!("\n{}:", title.cyan().bold());
    for path in paths {
        println!("  • {}", paint(path));
    }
}

fn print_results(results: Option<&[ArtifactResult]>) {
    let Some(results) = results else {
        println!("\n{}", "No artifacts changed".yellow());
        return;
    };

    println!("\n{}", "📦 Artifacts:".cyan().bold());
    for result in results {
        match result {
            ArtifactResult::File { path, contents } => {
                println!(
                    "  • {} {}",
                    path.white().bold(),
                    format!("({} bytes)", contents.len()).dimmed()
                );
            }
            ArtifactResult::Deleted { path } => {
                println!("  • {} {}", path.red(), "(deleted)".dimmed());
            }
            ArtifactResult::Error(err) => {
                println!("  • {} {}", err.path.red().bold(), "failed".red());
                for line in err.message.lines() {
                    println!("      {}", line.dimmed());
                }
            }
        }
    }
}

fn unrelated_changes(status: &RepoStatus, manifest: &str) -> usize {
    status
        .modified
        .iter()
        .chain(&status.not_added)
        .chain(&status.deleted)
        .filter(|path| path.as_str() != manifest)
        .count()
}

fn parse_dependencies(raw: &[String]) -> Result<Vec<DependencyRef>> {
    raw.iter()
        .map(|dep| {
            dep.parse::<DependencyRef>()
                .with_context(|| format!("Invalid --dep value '{dep}'"))
        })
        .collect()
}

fn merge_update_config(mut config: UpdateConfig, args: &UpdateArgs) -> Result<UpdateConfig> {
    config
        .post_update_options
        .extend(PostUpdateOption::parse_set(&args.options));

    if let Some(kind) = &args.update_type {
        config.update_kind = kind.parse::<UpdateKind>()?;
    }
    if args.new_major.is_some() && config.update_kind != UpdateKind::Major {
        bail!("--new-major requires --update-type major");
    }
    config.new_major_version = args.new_major;
    Ok(config)
}

fn describe_options(config: &UpdateConfig) -> String {
    if config.post_update_options.is_empty() {
        return "none".to_string();
    }
    config
        .post_update_options
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
