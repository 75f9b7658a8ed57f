//! Test discovery and loading
//!
//! A test file is either a JSON array of step objects or an object with a
//! `steps` array. Directories contribute every `*.json` file directly
//! inside them, in name order.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::common::{Error, Result};

/// A step as written in the test file
pub type Step = Map<String, Value>;

/// A loaded test file
#[derive(Debug, Clone)]
pub struct TestFile {
    /// Where the file was loaded from
    pub path: PathBuf,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl TestFile {
    /// Short label used in step ids and reports (the file stem)
    pub fn label(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Load and validate a single test file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let data: Value = serde_json::from_str(&content)
            .map_err(|e| Error::invalid_test_file(path, e.to_string()))?;
        Self::from_value(path, data)
    }

    /// Normalize parsed JSON into a list of step objects
    pub fn from_value(path: &Path, data: Value) -> Result<Self> {
        let steps = match data {
            Value::Array(steps) => steps,
            Value::Object(mut map) => match map.remove("steps") {
                Some(Value::Array(steps)) => steps,
                _ => {
                    return Err(Error::invalid_test_file(
                        path,
                        "must be a JSON array or {\"steps\": [...]}",
                    ))
                }
            },
            _ => {
                return Err(Error::invalid_test_file(
                    path,
                    "must be a JSON array or {\"steps\": [...]}",
                ))
            }
        };

        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| match step {
                Value::Object(map) => Ok(map),
                _ => Err(Error::invalid_test_file(
                    path,
                    format!("step {} must be a JSON object", i + 1),
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            steps,
        })
    }
}

/// Expand the given paths into a list of test files
pub fn collect_test_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut collected = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .map_err(|e| Error::FileRead {
                    path: path.display().to_string(),
                    error: e.to_string(),
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            found.sort();
            collected.extend(found);
        } else if path.is_file() {
            collected.push(path.clone());
        } else {
            return Err(Error::TestPathNotFound(path.clone()));
        }
    }
    Ok(collected)
}

/// Discover and load every test file under `paths`
pub fn load_tests(paths: &[PathBuf]) -> Result<Vec<TestFile>> {
    let files = collect_test_files(paths)?;
    tracing::debug!(count = files.len(), "Discovered test files");
    files.iter().map(|path| TestFile::load(path)).collect()
}

/// Whether any step asks the engine for a screenshot
///
/// Headless engines cannot render, so such suites need a window.
pub fn has_screenshot(tests: &[TestFile]) -> bool {
    tests.iter().flat_map(|t| &t.steps).any(|step| {
        step.get("type").and_then(Value::as_str) == Some("command")
            && step.get("name").and_then(Value::as_str) == Some("screenshot")
    })
}
