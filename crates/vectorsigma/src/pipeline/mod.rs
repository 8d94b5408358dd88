//! The generation workflow, run as a state machine
//!
//! The workflow is described by an embedded diagram, parsed with
//! [`UmlParser`] and executed by [`Machine`]. Each diagram action and guard
//! maps to a variant of [`PipelineAction`] or [`PipelineGuard`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as _};
use tracing::{debug, info, span, Level};

use crate::core::{GeneratorError, VectorSigmaError};
use crate::generator::{Generator, GeneratorConfig, Manifest, Shell, SystemShell};
use crate::machine::{Action, ExtendedState, Guard, Machine, Registry};
use crate::uml::{extract_plantuml, Fsm, UmlParser};

/// Diagram of the generation workflow
pub const PIPELINE_DIAGRAM: &str = include_str!("pipeline.puml");

/// Files written only when they do not exist yet
const WRITE_ONCE: [&str; 4] = ["extended_state.rs", "mod.rs", "Cargo.toml", "main.rs"];

/// Files merged with their existing version
const MERGED: [&str; 4] = ["actions.rs", "guards.rs", "actions_test.rs", "guards_test.rs"];

/// Extended state of a pipeline run
pub struct PipelineState {
    pub config: GeneratorConfig,
    pub module: String,
    pub output: PathBuf,
    pub input_data: String,
    pub generator: Option<Generator>,
    pub generated_files: Manifest,
    pub package_exists: bool,
    /// Files written so far, in write order
    pub written: Vec<PathBuf>,
    shell: Option<Box<dyn Shell>>,
    error: Option<anyhow::Error>,
}

impl PipelineState {
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_shell(config, Box::new(SystemShell))
    }

    pub fn with_shell(config: GeneratorConfig, shell: Box<dyn Shell>) -> Self {
        Self {
            config,
            module: String::new(),
            output: PathBuf::new(),
            input_data: String::new(),
            generator: None,
            generated_files: Manifest::new(),
            package_exists: false,
            written: Vec::new(),
            shell: Some(shell),
            error: None,
        }
    }
}

impl ExtendedState for PipelineState {
    fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    fn set_error(&mut self, error: anyhow::Error) {
        self.error = Some(error);
    }

    fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }
}

/// Steps of the generation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineAction {
    Initialize,
    LoadInput,
    ExtractUml,
    ParseUml,
    GenerateStateMachine,
    GenerateModuleFiles,
    CreateOutputFolder,
    MakeIncrementalUpdates,
    FilterGeneratedFiles,
    WriteGeneratedFiles,
    FormatCode,
}

impl PipelineAction {
    pub const ALL: [PipelineAction; 11] = [
        PipelineAction::Initialize,
        PipelineAction::LoadInput,
        PipelineAction::ExtractUml,
        PipelineAction::ParseUml,
        PipelineAction::GenerateStateMachine,
        PipelineAction::GenerateModuleFiles,
        PipelineAction::CreateOutputFolder,
        PipelineAction::MakeIncrementalUpdates,
        PipelineAction::FilterGeneratedFiles,
        PipelineAction::WriteGeneratedFiles,
        PipelineAction::FormatCode,
    ];

    /// Name used in the workflow diagram
    pub fn name(self) -> &'static str {
        match self {
            PipelineAction::Initialize => "Initialize",
            PipelineAction::LoadInput => "LoadInput",
            PipelineAction::ExtractUml => "ExtractUML",
            PipelineAction::ParseUml => "ParseUML",
            PipelineAction::GenerateStateMachine => "GenerateStateMachine",
            PipelineAction::GenerateModuleFiles => "GenerateModuleFiles",
            PipelineAction::CreateOutputFolder => "CreateOutputFolder",
            PipelineAction::MakeIncrementalUpdates => "MakeIncrementalUpdates",
            PipelineAction::FilterGeneratedFiles => "FilterGeneratedFiles",
            PipelineAction::WriteGeneratedFiles => "WriteGeneratedFiles",
            PipelineAction::FormatCode => "FormatCode",
        }
    }
}

impl Action<PipelineState> for PipelineAction {
    fn execute(&self, state: &mut PipelineState, params: &[String]) -> anyhow::Result<()> {
        match self {
            PipelineAction::Initialize => initialize(state),
            PipelineAction::LoadInput => load_input(state),
            PipelineAction::ExtractUml => {
                state.input_data = extract_plantuml(&state.input_data)?.to_string();
                Ok(())
            }
            PipelineAction::ParseUml => parse_uml(state),
            PipelineAction::GenerateStateMachine => {
                state.generated_files = generator(&state.generator)?.generate_state_machine()?;
                Ok(())
            }
            PipelineAction::GenerateModuleFiles => {
                let files = std::mem::take(&mut state.generated_files);
                state.generated_files =
                    generator(&state.generator)?.generate_module_files(&state.output, files)?;
                Ok(())
            }
            PipelineAction::CreateOutputFolder => create_output_folder(state, params),
            PipelineAction::MakeIncrementalUpdates => make_incremental_updates(state),
            PipelineAction::FilterGeneratedFiles => filter_generated_files(state),
            PipelineAction::WriteGeneratedFiles => write_generated_files(state),
            PipelineAction::FormatCode => format_code(state),
        }
    }
}

/// Decisions of the generation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineGuard {
    IsError,
    IsMarkdown,
    IsInitializingModule,
    PackageExists,
}

impl PipelineGuard {
    pub const ALL: [PipelineGuard; 4] = [
        PipelineGuard::IsError,
        PipelineGuard::IsMarkdown,
        PipelineGuard::IsInitializingModule,
        PipelineGuard::PackageExists,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PipelineGuard::IsError => "IsError",
            PipelineGuard::IsMarkdown => "IsMarkdown",
            PipelineGuard::IsInitializingModule => "IsInitializingModule",
            PipelineGuard::PackageExists => "PackageExists",
        }
    }
}

impl Guard<PipelineState> for PipelineGuard {
    fn check(&self, state: &PipelineState) -> bool {
        match self {
            PipelineGuard::IsError => state.error.is_some(),
            PipelineGuard::IsMarkdown => state
                .config
                .input
                .extension()
                .is_some_and(|ext| ext == "md"),
            PipelineGuard::IsInitializingModule => state.config.init,
            PipelineGuard::PackageExists => state.package_exists,
        }
    }
}

/// Bind every workflow action and guard by its diagram name
pub fn registry() -> Registry<PipelineState> {
    let registry = PipelineAction::ALL
        .into_iter()
        .fold(Registry::new(), |registry, action| {
            registry.action(action.name(), action)
        });
    PipelineGuard::ALL
        .into_iter()
        .fold(registry, |registry, guard| registry.guard(guard.name(), guard))
}

/// Parse the embedded workflow diagram
pub fn pipeline_model() -> Fsm {
    UmlParser::new().parse(PIPELINE_DIAGRAM)
}

/// Generate a state machine package as described by `config`.
///
/// Returns the files written, relative paths joined onto the output
/// directory.
pub fn run(config: GeneratorConfig) -> Result<Vec<PathBuf>, VectorSigmaError> {
    run_with_shell(config, Box::new(SystemShell))
}

/// Like [`run`], with the shell used to run the formatter
pub fn run_with_shell(
    config: GeneratorConfig,
    shell: Box<dyn Shell>,
) -> Result<Vec<PathBuf>, VectorSigmaError> {
    let run_span = span!(Level::INFO, "generate", input = %config.input.display());
    let _enter = run_span.enter();

    let mut machine = Machine::from_model(
        &pipeline_model(),
        &registry(),
        PipelineState::with_shell(config, shell),
    )?;
    machine.run()?;

    let written = machine.into_extended_state().written;
    info!(files = written.len(), "Generation complete");
    Ok(written)
}

fn generator(generator: &Option<Generator>) -> anyhow::Result<&Generator> {
    generator
        .as_ref()
        .ok_or_else(|| anyhow!("the diagram has not been parsed yet"))
}

fn initialize(state: &mut PipelineState) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("failed to get working directory")?;

    state.module = match &state.config.module {
        Some(module) => module.clone(),
        None => cwd
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    state.output = state.config.output.clone().unwrap_or(cwd);
    if state.output.exists() && !state.output.is_dir() {
        return Err(GeneratorError::InvalidOutput {
            path: state.output.clone(),
        }
        .into());
    }

    state.generated_files.clear();
    state.written.clear();
    state.package_exists = false;
    debug!(module = %state.module, output = %state.output.display(), "Initialized");
    Ok(())
}

fn load_input(state: &mut PipelineState) -> anyhow::Result<()> {
    let input = &state.config.input;
    state.input_data = fs::read_to_string(input)
        .with_context(|| format!("failed to read input file {}", input.display()))?;
    Ok(())
}

fn parse_uml(state: &mut PipelineState) -> anyhow::Result<()> {
    let fsm = UmlParser::new().parse(&state.input_data);
    info!(
        title = %fsm.title,
        states = fsm.all_states.len(),
        actions = fsm.action_names.len(),
        guards = fsm.guard_names.len(),
        "Parsed diagram"
    );

    let shell = state
        .shell
        .take()
        .unwrap_or_else(|| Box::new(SystemShell));
    state.generator = Some(
        Generator::new(state.module.clone(), state.config.package.clone(), fsm).with_shell(shell),
    );
    Ok(())
}

/// Create `<output>/[<subdir>/]<package>`, or note that it already exists
fn create_output_folder(state: &mut PipelineState, params: &[String]) -> anyhow::Result<()> {
    let mut folder = state.output.clone();
    if let Some(subdir) = params.first() {
        folder.push(subdir);
    }
    folder.push(&state.config.package);

    let generator = generator(&state.generator)?;
    if generator.exists(&folder)? && !state.config.init {
        debug!(folder = %folder.display(), "Package exists");
        state.package_exists = true;
        return Ok(());
    }

    fs::create_dir_all(&folder).map_err(|e| GeneratorError::io(&folder, e))?;
    debug!(folder = %folder.display(), "Created package directory");
    Ok(())
}

fn make_incremental_updates(state: &mut PipelineState) -> anyhow::Result<()> {
    let generator = generator(&state.generator)?;

    for (path, file) in state.generated_files.iter_mut() {
        if !has_file_name(path, &MERGED) {
            continue;
        }
        let full_path = state.output.join(path);
        if !generator.exists(&full_path)? {
            continue;
        }

        debug!(file = %path.display(), "Running incremental update");
        let outcome = generator
            .incremental_update(&full_path, &file.content)
            .context("incremental update failed")?;
        file.content = outcome.source;
        file.incremental_change = outcome.changed;
    }
    Ok(())
}

fn filter_generated_files(state: &mut PipelineState) -> anyhow::Result<()> {
    let generator = generator(&state.generator)?;

    let mut skipped = Vec::new();
    for (path, file) in &state.generated_files {
        if !generator.exists(&state.output.join(path))? {
            continue;
        }
        let keep_existing = has_file_name(path, &WRITE_ONCE)
            || (has_file_name(path, &MERGED) && !file.incremental_change);
        if keep_existing {
            skipped.push(path.clone());
        }
    }

    for path in skipped {
        debug!(file = %path.display(), "Keeping existing file");
        state.generated_files.remove(&path);
    }
    Ok(())
}

fn write_generated_files(state: &mut PipelineState) -> anyhow::Result<()> {
    let generator = generator(&state.generator)?;
    for (path, file) in &state.generated_files {
        let full_path = state.output.join(path);
        generator.write_file(&full_path, &file.content)?;
        state.written.push(full_path);
    }
    Ok(())
}

fn format_code(state: &mut PipelineState) -> anyhow::Result<()> {
    let generator = generator(&state.generator)?;
    for path in state
        .written
        .iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "rs"))
    {
        generator.format_code(path)?;
    }
    Ok(())
}

fn has_file_name(path: &Path, names: &[&str]) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| names.contains(&name))
}
