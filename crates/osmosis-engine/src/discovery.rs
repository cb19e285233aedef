//! Resolving a user-supplied path into definition files

use osmosis_core::Config;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Discovery errors
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("File Not Found: {0}")]
    NotFound(String),

    #[error("{0} is outside the project root")]
    OutsideProject(String),

    #[error("Failed to walk {0}: {1}")]
    Walk(String, String),
}

/// Project-relative definition files under `path`
///
/// A path that does not start with the definitions directory is joined onto
/// it. Directories are walked recursively, sorted by file name, keeping only
/// files with the configured extension. Returned paths use `/` separators,
/// the same form the compiler reports in `fileName`.
pub fn discover(config: &Config, path: &Path) -> Result<Vec<String>, DiscoveryError> {
    let relative = project_relative(config, path)?;
    let relative = if relative.starts_with(&config.definitions_dir) {
        relative
    } else {
        config.definitions_dir.join(relative)
    };

    let full = config.resolve(&relative);
    if !full.exists() {
        return Err(DiscoveryError::NotFound(to_project_path(&relative)));
    }

    if !full.is_dir() {
        return Ok(vec![to_project_path(&relative)]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&full).sort_by_file_name() {
        let entry = entry.map_err(|e| DiscoveryError::Walk(full.display().to_string(), e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let matches = entry
            .path()
            .extension()
            .map_or(false, |ext| ext == config.extension.as_str());
        if !matches {
            continue;
        }

        let inner = entry.path().strip_prefix(&full).unwrap_or(entry.path());
        files.push(to_project_path(&relative.join(inner)));
    }

    tracing::debug!(path = %to_project_path(&relative), files = files.len(), "Discovered definition files");
    Ok(files)
}

fn project_relative(config: &Config, path: &Path) -> Result<PathBuf, DiscoveryError> {
    let relative = if path.is_absolute() {
        path.strip_prefix(&config.project_root)
            .map_err(|_| DiscoveryError::OutsideProject(path.display().to_string()))?
    } else {
        path
    };

    Ok(relative
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect())
}

/// `/`-separated form of a relative path, without `.` components
pub fn to_project_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project(files: &[&str]) -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "content").unwrap();
        }
        let config = Config::discover(dir.path()).unwrap();
        (dir, config)
    }

    #[test]
    fn single_file_with_implied_definitions_dir() {
        let (_dir, config) = project(&["definitions/marts/test/test.sqlx"]);
        let files = discover(&config, Path::new("marts/test/test.sqlx")).unwrap();
        assert_eq!(files, ["definitions/marts/test/test.sqlx"]);
    }

    #[test]
    fn explicit_definitions_prefix() {
        let (_dir, config) = project(&["definitions/marts/test/test.sqlx"]);
        let files = discover(&config, Path::new("definitions/marts/test/test.sqlx")).unwrap();
        assert_eq!(files, ["definitions/marts/test/test.sqlx"]);
    }

    #[test]
    fn directories_are_walked_recursively_and_sorted() {
        let (_dir, config) = project(&[
            "definitions/marts/test/test2.sqlx",
            "definitions/marts/test/test1.sqlx",
            "definitions/marts/test/test3.txt",
            "definitions/marts/test/sub/nested.sqlx",
        ]);

        let files = discover(&config, Path::new("marts/test")).unwrap();
        assert_eq!(
            files,
            [
                "definitions/marts/test/sub/nested.sqlx",
                "definitions/marts/test/test1.sqlx",
                "definitions/marts/test/test2.sqlx",
            ]
        );
    }

    #[test]
    fn whole_definitions_tree() {
        let (_dir, config) = project(&["definitions/a.sqlx", "definitions/b/c.sqlx", "includes/x.sqlx"]);
        let files = discover(&config, Path::new("definitions")).unwrap();
        assert_eq!(files, ["definitions/a.sqlx", "definitions/b/c.sqlx"]);
    }

    #[test]
    fn missing_path_is_an_error() {
        let (_dir, config) = project(&["definitions/marts/test/other.sqlx"]);
        let err = discover(&config, Path::new("marts/test/nonexistent.sqlx")).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound(_)));
        assert!(err.to_string().contains("File Not Found"));
    }

    #[test]
    fn absolute_paths_inside_the_project() {
        let (dir, config) = project(&["definitions/a.sqlx"]);
        let files = discover(&config, &dir.path().join("definitions")).unwrap();
        assert_eq!(files, ["definitions/a.sqlx"]);

        assert!(matches!(
            discover(&config, Path::new("/definitely/elsewhere")),
            Err(DiscoveryError::OutsideProject(_))
        ));
    }

    #[test]
    fn leading_dot_component() {
        let (_dir, config) = project(&["definitions/a.sqlx"]);
        let files = discover(&config, Path::new("./definitions/a.sqlx")).unwrap();
        assert_eq!(files, ["definitions/a.sqlx"]);
    }

    #[test]
    fn custom_extension() {
        let (_dir, mut config) = project(&["definitions/a.sqlx", "definitions/b.sql"]);
        config.extension = "sql".to_string();
        let files = discover(&config, Path::new("definitions")).unwrap();
        assert_eq!(files, ["definitions/b.sql"]);
    }
}
