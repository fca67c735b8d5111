//! Library build step.

use crate::{
    error::{ClientError, Result},
    writers::CreateLibraryInvocation,
};

use tracing::info;

use std::{fs, process::Command};

/// Builds a library out of logic files.
pub trait BuildTool {
    /// Runs the builder and returns its exit code.
    fn create_library(&self, invocation: &CreateLibraryInvocation) -> Result<i32>;
}

/// Runs the library builder as a child process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessBuildTool;

impl BuildTool for ProcessBuildTool {
    fn create_library(&self, invocation: &CreateLibraryInvocation) -> Result<i32> {
        fs::create_dir_all(&invocation.cwd).map_err(|e| ClientError::file(&invocation.cwd, e))?;
        info!("Running {}", invocation.command_line());

        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .status()
            .map_err(|source| ClientError::Spawn {
                program: invocation.program.display().to_string(),
                source,
            })?;
        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::path::PathBuf;

    #[test]
    fn reports_exit_code_and_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = CreateLibraryInvocation {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "touch built; exit 3".to_string()],
            cwd: dir.path().join("out"),
        };
        assert_eq!(ProcessBuildTool.create_library(&invocation).unwrap(), 3);
        assert!(dir.path().join("out/built").is_file());

        let missing = CreateLibraryInvocation {
            program: PathBuf::from("/nonexistent/TensileCreateLibrary"),
            ..invocation
        };
        assert!(matches!(
            ProcessBuildTool.create_library(&missing),
            Err(ClientError::Spawn { .. })
        ));
    }
}
