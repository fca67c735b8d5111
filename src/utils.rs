//! Utility functions and traits.

use crate::error::{ClientError, Result};

use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

/// Utility trait rendering a value the way the native client expects it on the right-hand side
/// of an INI `key=value` line.
///
/// Booleans are spelled `True`/`False` and integral floats keep a trailing `.0`, which is what
/// the client's parser has always been fed.
pub trait IniValue {
    fn ini(&self) -> String;
}

impl IniValue for bool {
    fn ini(&self) -> String {
        match self {
            true => "True".to_string(),
            false => "False".to_string(),
        }
    }
}

impl IniValue for f64 {
    fn ini(&self) -> String {
        if self.is_finite() && self.fract() == 0.0 && self.abs() < 1e16 {
            format!("{self:.1}")
        } else {
            format!("{self}")
        }
    }
}

macro_rules! ini_display {
    ($($t:ty),*) => {
        $(
            impl IniValue for $t {
                fn ini(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

ini_display!(i32, i64, u32, u64, usize, str, String);

impl IniValue for Path {
    fn ini(&self) -> String {
        self.display().to_string()
    }
}

impl IniValue for PathBuf {
    fn ini(&self) -> String {
        self.display().to_string()
    }
}

impl<T: IniValue + ?Sized> IniValue for &T {
    fn ini(&self) -> String {
        (**self).ini()
    }
}

/// Joins values with `sep`.
pub fn join<T: Display>(values: &[T], sep: &str) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Renders a C++ brace initializer: `{a, b, c}`.
pub fn list_to_initializer<T: Display>(values: &[T]) -> String {
    format!("{{{}}}", join(values, ", "))
}

/// C++ spelling of a boolean.
pub fn cpp_bool(value: bool) -> &'static str {
    match value {
        true => "true",
        false => "false",
    }
}

/// Writes `contents` to `path`, creating parent directories as needed.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ClientError::file(parent, e))?;
        }
    }
    fs::write(path, contents).map_err(|e| ClientError::file(path, e))
}

/// Marks a generated script as executable by everyone.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o777))
        .map_err(|e| ClientError::file(path, e))
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Lists the regular files of `dir` whose name satisfies `keep`, sorted by path.
pub fn list_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| ClientError::file(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ClientError::file(dir, e))?.path();
        if path.is_file() && keep(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Returns whether `path` has the extension `ext`.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ini_values_follow_client_conventions() {
        assert_eq!(true.ini(), "True");
        assert_eq!(false.ini(), "False");
        assert_eq!(2.0_f64.ini(), "2.0");
        assert_eq!(0.85_f64.ini(), "0.85");
        assert_eq!((-1_i64).ini(), "-1");
        assert_eq!("Zero".ini(), "Zero");
    }

    #[test]
    fn initializer_is_brace_enclosed() {
        assert_eq!(list_to_initializer(&[0, 1, 3]), "{0, 1, 3}");
        assert_eq!(list_to_initializer::<usize>(&[]), "{}");
    }

    #[test]
    fn list_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.json", "c.txt"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        fs::create_dir(dir.path().join("d.json")).unwrap();

        let files = list_files(dir.path(), |p| has_extension(p, "json")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.json", "b.json"]);
    }
}
