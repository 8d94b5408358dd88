//! External commands run by the generator

use std::process::Command;

use tracing::debug;

use crate::core::GeneratorError;

/// Runs external programs, such as the code formatter
pub trait Shell {
    fn run(&self, program: &str, args: &[&str]) -> Result<(), GeneratorError>;
}

/// Runs commands as child processes of the current process
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShell;

impl Shell for SystemShell {
    fn run(&self, program: &str, args: &[&str]) -> Result<(), GeneratorError> {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(%command, "Running command");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| GeneratorError::Command {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(GeneratorError::Command {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program() {
        let err = SystemShell
            .run("vectorsigma-no-such-program", &["--version"])
            .unwrap_err();
        assert!(matches!(
            err,
            GeneratorError::Command { ref command, .. } if command == "vectorsigma-no-such-program --version"
        ));
    }
}
