//! Generated artifacts consumed by the native client: INI configuration files, the
//! `ClientParameters.h` header, and the shell scripts mirroring the build and run invocations.

pub mod header;
pub mod ini;
pub mod scripts;

pub use header::{client_parameters_header, write_client_parameters, HeaderMode};
pub use ini::{
    client_config_ini, write_benchmark_config_for_sizes, write_client_config, ClientConfig,
    ConfigStep,
};
pub use scripts::{
    build_script, create_library_command, default_config_paths, run_script, write_build_script,
    write_run_script, CreateLibraryInvocation, RunMode,
};
