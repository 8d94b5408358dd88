//! Code generation for state machine packages
//!
//! A [`Generator`] renders a parsed [`Fsm`] into the files of a Rust
//! module, merges them into earlier generations and writes them to disk.
//!
//! A package named `fsm` contains:
//!
//! | File | Owner |
//! |------|-------|
//! | `fsm/actions.rs` | user, merged on regeneration |
//! | `fsm/guards.rs` | user, merged on regeneration |
//! | `fsm/extended_state.rs` | user, written once |
//! | `fsm/mod.rs` | user, written once |
//! | `fsm/zz_generated_statemachine.rs` | generator, always rewritten |
//! | `fsm/actions_test.rs` | user, merged on regeneration |
//! | `fsm/guards_test.rs` | user, merged on regeneration |
//! | `fsm/zz_generated_statemachine_test.rs` | generator, always rewritten |
//!
//! Initializing a new crate adds `Cargo.toml` and `src/main.rs` and moves
//! the package under `src/`.

mod shell;
mod templates;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::{GeneratorError, VectorSigmaError};
use crate::merge::{merge, MergeOutcome};
use crate::uml::Fsm;

pub use shell::{Shell, SystemShell};
pub use templates::{machine_name, to_snake_case};

/// Package name used when none is given
pub const DEFAULT_PACKAGE: &str = "fsm";

/// Name of the always regenerated runtime file
pub const STATE_MACHINE_FILE: &str = "zz_generated_statemachine.rs";

/// Name of the always regenerated runtime test
pub const STATE_MACHINE_TEST_FILE: &str = "zz_generated_statemachine_test.rs";

/// Options for a generator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Crate name for new crates; defaults to the current directory name
    pub module: Option<String>,
    pub package: String,
    /// Diagram file, `.puml` or Markdown
    pub input: PathBuf,
    /// Output directory; defaults to the current directory
    pub output: Option<PathBuf>,
    /// Create a new crate instead of a package in an existing one
    pub init: bool,
}

impl GeneratorConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            module: None,
            package: DEFAULT_PACKAGE.to_string(),
            input: input.into(),
            output: None,
            init: false,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }
}

/// Files to render, one per generated file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Actions,
    Guards,
    ExtendedState,
    StateMachine,
    Module,
    ActionsTest,
    GuardsTest,
    StateMachineTest,
    CargoToml,
    Main,
}

impl Template {
    /// Templates of a package, in the order they are generated
    pub const PACKAGE: [Template; 8] = [
        Template::Actions,
        Template::Guards,
        Template::ExtendedState,
        Template::Module,
        Template::StateMachine,
        Template::ActionsTest,
        Template::GuardsTest,
        Template::StateMachineTest,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Template::Actions => "actions.rs",
            Template::Guards => "guards.rs",
            Template::ExtendedState => "extended_state.rs",
            Template::StateMachine => STATE_MACHINE_FILE,
            Template::Module => "mod.rs",
            Template::ActionsTest => "actions_test.rs",
            Template::GuardsTest => "guards_test.rs",
            Template::StateMachineTest => STATE_MACHINE_TEST_FILE,
            Template::CargoToml => "Cargo.toml",
            Template::Main => "main.rs",
        }
    }
}

/// A rendered file waiting to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub content: String,
    /// Set when merging into an existing file changed it
    pub incremental_change: bool,
}

impl GeneratedFile {
    pub fn new(content: String) -> Self {
        Self {
            content,
            incremental_change: false,
        }
    }
}

/// Generated files keyed by path relative to the output directory
pub type Manifest = BTreeMap<PathBuf, GeneratedFile>;

/// Renders and writes the files of one state machine package
pub struct Generator {
    pub module: String,
    pub package: String,
    pub fsm: Fsm,
    shell: Box<dyn Shell>,
}

impl Generator {
    pub fn new(module: impl Into<String>, package: impl Into<String>, fsm: Fsm) -> Self {
        Self {
            module: module.into(),
            package: package.into(),
            fsm,
            shell: Box::new(SystemShell),
        }
    }

    /// Replace the shell used to run the formatter
    pub fn with_shell(mut self, shell: Box<dyn Shell>) -> Self {
        self.shell = shell;
        self
    }

    /// Render one template.
    ///
    /// Fails when a name in the diagram is not a valid Rust identifier.
    pub fn render(&self, template: Template) -> Result<String, GeneratorError> {
        self.check_identifiers()?;

        let rendered = match template {
            Template::Actions => templates::actions(&self.fsm),
            Template::Guards => templates::guards(&self.fsm),
            Template::ExtendedState => templates::extended_state(&self.fsm),
            Template::StateMachine => templates::state_machine(&self.fsm),
            Template::Module => templates::module(&self.fsm),
            Template::ActionsTest => templates::actions_test(&self.fsm),
            Template::GuardsTest => templates::guards_test(&self.fsm),
            Template::StateMachineTest => templates::state_machine_test(&self.fsm),
            Template::CargoToml => templates::cargo_toml(&self.module),
            Template::Main => templates::main_rs(&self.fsm, &self.package),
        };
        rendered.map_err(|e| {
            GeneratorError::render_error(format!("{}: {}", template.file_name(), e))
        })
    }

    /// Render every package file under `<package>/`
    pub fn generate_state_machine(&self) -> Result<Manifest, GeneratorError> {
        let mut manifest = Manifest::new();
        for template in Template::PACKAGE {
            let path = Path::new(&self.package).join(template.file_name());
            debug!(path = %path.display(), "Rendered file");
            manifest.insert(path, GeneratedFile::new(self.render(template)?));
        }
        Ok(manifest)
    }

    /// Turn a package manifest into the manifest of a new crate.
    ///
    /// Package files move under `src/`; `Cargo.toml` and `src/main.rs` are
    /// added. Fails if either already exists in `output`.
    pub fn generate_module_files(
        &self,
        output: &Path,
        manifest: Manifest,
    ) -> Result<Manifest, GeneratorError> {
        let mut files: Manifest = manifest
            .into_iter()
            .map(|(path, file)| (Path::new("src").join(path), file))
            .collect();

        for (template, path) in [
            (Template::CargoToml, PathBuf::from("Cargo.toml")),
            (Template::Main, Path::new("src").join("main.rs")),
        ] {
            let target = output.join(&path);
            if self.exists(&target)? {
                return Err(GeneratorError::FileExists { path: target });
            }
            files.insert(path, GeneratedFile::new(self.render(template)?));
        }
        Ok(files)
    }

    /// Merge freshly generated code into the file at `path`
    pub fn incremental_update(
        &self,
        path: &Path,
        generated: &str,
    ) -> Result<MergeOutcome, VectorSigmaError> {
        let existing = fs::read_to_string(path).map_err(|e| GeneratorError::io(path, e))?;
        let outcome = merge(&existing, generated)?;
        debug!(path = %path.display(), changed = outcome.changed, "Merged file");
        Ok(outcome)
    }

    pub fn exists(&self, path: &Path) -> Result<bool, GeneratorError> {
        path.try_exists().map_err(|e| GeneratorError::io(path, e))
    }

    /// Write a file, creating missing parent directories
    pub fn write_file(&self, path: &Path, content: &str) -> Result<(), GeneratorError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| GeneratorError::io(parent, e))?;
        }
        fs::write(path, content).map_err(|e| GeneratorError::io(path, e))?;
        info!(path = %path.display(), "Wrote file");
        Ok(())
    }

    /// Run `rustfmt` on a generated file
    pub fn format_code(&self, path: &Path) -> Result<(), GeneratorError> {
        let path = path.to_string_lossy();
        self.shell.run("rustfmt", &["--edition", "2021", path.as_ref()])
    }

    fn check_identifiers(&self) -> Result<(), GeneratorError> {
        let names = self
            .fsm
            .all_states
            .iter()
            .chain(&self.fsm.action_names)
            .chain(&self.fsm.guard_names)
            .map(String::as_str)
            .chain([machine_name(&self.fsm), self.package.as_str()]);

        for name in names {
            let snake = to_snake_case(name);
            if syn::parse_str::<syn::Ident>(name).is_err()
                || syn::parse_str::<syn::Ident>(&snake).is_err()
            {
                return Err(GeneratorError::render_error(format!(
                    "`{}` is not a valid Rust identifier",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uml::UmlParser;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingShell(Rc<RefCell<Vec<String>>>);

    impl Shell for RecordingShell {
        fn run(&self, program: &str, args: &[&str]) -> Result<(), GeneratorError> {
            self.0
                .borrow_mut()
                .push(format!("{} {}", program, args.join(" ")));
            Ok(())
        }
    }

    fn generator() -> Generator {
        let fsm = UmlParser::new().parse(
            "title Lights\n[*] --> Red\nRed: do / SwitchIn\nRed --> [*]: [ IsError ]\nRed --> [*]",
        );
        Generator::new("lights", "fsm", fsm)
    }

    #[test]
    fn test_config_defaults() {
        let config = GeneratorConfig::new("lights.puml");
        assert_eq!(config.package, "fsm");
        assert_eq!(config.module, None);
        assert!(!config.init);

        let config = config.with_module("lights").with_output("out").with_init(true);
        assert_eq!(config.module.as_deref(), Some("lights"));
        assert_eq!(config.output, Some(PathBuf::from("out")));
        assert!(config.init);
    }

    #[test]
    fn test_generate_state_machine_paths() {
        let manifest = generator().generate_state_machine().unwrap();
        let paths: Vec<_> = manifest.keys().cloned().collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("fsm/actions.rs"),
                PathBuf::from("fsm/actions_test.rs"),
                PathBuf::from("fsm/extended_state.rs"),
                PathBuf::from("fsm/guards.rs"),
                PathBuf::from("fsm/guards_test.rs"),
                PathBuf::from("fsm/mod.rs"),
                PathBuf::from("fsm/zz_generated_statemachine.rs"),
                PathBuf::from("fsm/zz_generated_statemachine_test.rs"),
            ]
        );
        assert!(manifest.values().all(|f| !f.incremental_change));
    }

    #[test]
    fn test_generate_module_files() {
        let dir = tempfile::tempdir().unwrap();
        let generator = generator();
        let manifest = generator.generate_state_machine().unwrap();
        let files = generator
            .generate_module_files(dir.path(), manifest)
            .unwrap();

        assert!(files.contains_key(Path::new("Cargo.toml")));
        assert!(files.contains_key(Path::new("src/main.rs")));
        assert!(files.contains_key(Path::new("src/fsm/actions.rs")));
        assert!(!files.contains_key(Path::new("fsm/actions.rs")));
    }

    #[test]
    fn test_generate_module_files_refuses_existing_crate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        let generator = generator();
        let manifest = generator.generate_state_machine().unwrap();
        let err = generator
            .generate_module_files(dir.path(), manifest)
            .unwrap_err();
        assert!(matches!(err, GeneratorError::FileExists { .. }));
    }

    #[test]
    fn test_invalid_identifier() {
        let fsm = UmlParser::new().parse("[*] --> A\nA: do / match");
        let err = Generator::new("x", "fsm", fsm)
            .render(Template::Actions)
            .unwrap_err();
        assert!(err.to_string().contains("`match`"));
    }

    #[test]
    fn test_write_creates_parents_and_formats() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let generator = generator().with_shell(Box::new(RecordingShell(Rc::clone(&calls))));

        let path = dir.path().join("fsm").join("mod.rs");
        generator.write_file(&path, "pub mod actions;\n").unwrap();
        assert!(generator.exists(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "pub mod actions;\n");

        generator.format_code(&path).unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![format!("rustfmt --edition 2021 {}", path.display())]
        );
    }

    #[test]
    fn test_incremental_update_reads_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actions.rs");
        fs::write(&path, "fn helper() {}\n").unwrap();

        let outcome = generator()
            .incremental_update(&path, "// +vectorsigma:action:A\nfn a() {}\n")
            .unwrap();
        assert!(outcome.changed);
        assert!(outcome.source.starts_with("fn helper() {}\n\n// +vectorsigma:action:A"));

        let missing = generator().incremental_update(&dir.path().join("nope.rs"), "");
        assert!(matches!(
            missing,
            Err(VectorSigmaError::Generator(GeneratorError::Io { .. }))
        ));
    }
}
