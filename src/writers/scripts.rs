//! Shell scripts mirroring the build and run steps, so a step can be replayed by hand.

use crate::{
    consts::CLIENT_PARAMETERS_BASE,
    error::Result,
    settings::ClientSettings,
    utils::{make_executable, write_file},
};

use tracing::debug;

use std::{
    fmt::Write,
    path::{Path, PathBuf},
};

const SCRIPT_PREAMBLE: &str = "#!/bin/bash\n\nset -ex\n";

const ERROR_SUMMARY: &str = "
ERR=0
if [[ $ERR1 -ne 0 ]]
then
    echo one
    ERR=$ERR1
fi
if [[ $ERR2 -ne 0 ]]
then
    echo two
    ERR=$ERR2
fi
";

/// A call of the library builder: the logic directory is compiled into code objects and a
/// master library under the output directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateLibraryInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Directory the builder runs in.
    pub cwd: PathBuf,
}

impl CreateLibraryInvocation {
    /// The invocation as a single shell line.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

fn flag(args: &mut Vec<String>, enabled: bool, name: &str) {
    match enabled {
        true => args.push(format!("--{name}")),
        false => args.push(format!("--no-{name}")),
    }
}

/// Builds the library-builder invocation for `logic_path`, writing into `output_path`.
pub fn create_library_command(
    settings: &ClientSettings,
    logic_path: &Path,
    output_path: &Path,
) -> CreateLibraryInvocation {
    let library = &settings.library;
    let mut args = Vec::new();
    flag(&mut args, library.merge_files, "merge-files");
    flag(&mut args, library.short_names, "short-file-names");
    flag(&mut args, library.library_print_debug, "library-print-debug");
    if library.asm_debug {
        args.push("--asm-debug".to_string());
    }
    if library.keep_build_tmp {
        args.push("--keep-build-tmp".to_string());
    }
    args.push(format!("--architecture={}", library.architecture));
    args.push(format!(
        "--code-object-version={}",
        library.code_object_version
    ));
    args.push(format!("--cxx-compiler={}", library.cxx_compiler));
    args.push(format!(
        "--library-format={}",
        library.library_format.as_str()
    ));
    args.push(logic_path.display().to_string());
    args.push(output_path.display().to_string());
    args.push(library.runtime_language.to_string());

    CreateLibraryInvocation {
        program: settings.paths.create_library.clone(),
        args,
        cwd: output_path.to_path_buf(),
    }
}

/// `build.sh` running `invocation`.
pub fn build_script(invocation: &CreateLibraryInvocation) -> String {
    format!("{SCRIPT_PREAMBLE}{}\n", invocation.command_line())
}

/// Writes an executable `build.sh` into `dir`.
pub fn write_build_script(dir: &Path, invocation: &CreateLibraryInvocation) -> Result<PathBuf> {
    let path = dir.join("build.sh");
    write_file(&path, &build_script(invocation))?;
    make_executable(&path)?;
    debug!("Wrote build script {}", path.display());
    Ok(path)
}

/// How the client is run by `run.sh`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Every solution is timed; errors are collected and the clocks optionally pinned.
    Benchmark,
    /// Only the best solution of each problem is run.
    Library,
}

/// Configuration files read when no explicit list is given: the client parameters next to the
/// build directory, and their granularity variant when tile-aware selection is on.
pub fn default_config_paths(build_dir: &Path, tile_aware_selection: bool) -> Vec<PathBuf> {
    let source = build_dir.join("..").join("source");
    let mut paths = vec![source.join(format!("{CLIENT_PARAMETERS_BASE}.ini"))];
    if tile_aware_selection {
        paths.push(source.join(format!("{CLIENT_PARAMETERS_BASE}_Granularity.ini")));
    }
    paths
}

/// `run.sh` running the client once per configuration file.
pub fn run_script(settings: &ClientSettings, mode: RunMode, configs: &[PathBuf]) -> Result<String> {
    let bench = &settings.benchmark;
    let exe = settings.paths.client_executable.display();
    let smi = match bench.pin_clocks {
        true => bench.rocm_smi_path.as_ref().map(|p| p.display()),
        false => None,
    };

    let mut s = String::from(SCRIPT_PREAMBLE);
    match mode {
        RunMode::Benchmark => {
            if let Some(smi) = &smi {
                writeln!(s, "{smi} -d 0 --setfan 255 --setsclk 7")?;
                writeln!(s, "sleep 1")?;
                writeln!(s, "{smi} -d 0 -a")?;
            }
            writeln!(s, "set +e")?;
            writeln!(s, "ERR1=0")?;
            for config in configs {
                writeln!(
                    s,
                    "{exe} --config-file {} {}",
                    config.display(),
                    bench.client_args
                )?;
            }
            writeln!(s, "ERR2=$?\n")?;
            s.push_str(ERROR_SUMMARY);
            if let Some(smi) = &smi {
                writeln!(s, "{smi} -d 0 --resetclocks")?;
                writeln!(s, "{smi} -d 0 --setfan 50")?;
            }
        }
        RunMode::Library => {
            for config in configs {
                writeln!(
                    s,
                    "{exe} --config-file {} {} --best-solution 1",
                    config.display(),
                    bench.client_args
                )?;
            }
        }
    }
    writeln!(s, "exit $ERR")?;
    Ok(s)
}

/// Writes an executable `run.sh` into `dir`.
pub fn write_run_script(
    settings: &ClientSettings,
    mode: RunMode,
    configs: &[PathBuf],
    dir: &Path,
) -> Result<PathBuf> {
    let path = dir.join("run.sh");
    write_file(&path, &run_script(settings, mode, configs)?)?;
    make_executable(&path)?;
    debug!("Wrote run script {}", path.display());
    Ok(path)
}
