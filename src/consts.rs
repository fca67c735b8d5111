//! Crate-level constants.

/// Characters naming the problem indices, in index order.
pub const INDEX_CHARS: &str = "IJKLMNOPQRSTUVWXYZ";

/// Number of leading-dimension values (`ldd`, `ldc`, `lda`, `ldb`) that an exact size list may
/// carry after the problem sizes.
pub const NUM_INDICES_LD: usize = 4;

/// Placeholder extent of free indices in a dummy problem.
pub const DUMMY_FREE_SIZE: usize = 128;

/// Placeholder extent of summation indices in a dummy problem.
pub const DUMMY_SUMMATION_SIZE: usize = 512;

/// Name of the generated header consumed by the client build.
pub const CLIENT_PARAMETERS_HEADER: &str = "ClientParameters.h";

/// Base name of the generated client configuration files.
pub const CLIENT_PARAMETERS_BASE: &str = "ClientParameters";

/// Library metadata file holding the problem type of a prebuilt library.
pub const LIBRARY_METADATA: &str = "metadata.json";

/// Default name of the results column summarized after a client run.
pub const DEFAULT_METRIC_COLUMN: &str = "gflops";

/// Banner written at the top of every generated C++ file.
pub const C_HEADER: &str = "\
/*******************************************************************************
 *
 * This file was generated by tensile-client. Do not edit it by hand: edit the
 * logic files and client settings instead and regenerate.
 *
 ******************************************************************************/

";

// NOTE: these bounds scale the macro tile when sizing benchmark buffers.
/// Macro-tile multiplier for the largest C/D buffer.
pub const MAX_MN_TILES: usize = 1296;

/// Macro-tile multiplier for the largest A/B buffer.
pub const MAX_K_TILES: usize = 36;

/// Workspace size factor relative to D.
pub const WORKSPACE_FACTOR: usize = 32;
