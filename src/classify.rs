//! Discovery of template files in a task's input directory.

use std::fs;

use camino::Utf8PathBuf;
use regex::Regex;

use crate::config::Task;
use crate::error::TaskError;

/// A template source file found in the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    pub path: Utf8PathBuf,
    /// File name without its last extension.
    pub base_name: String,
    pub is_partial: bool,
}

impl TemplateFile {
    /// Name the template is assigned or registered under, after the task's
    /// naming hooks.
    pub fn name(&self, task: &Task) -> String {
        let hook = if self.is_partial {
            &task.hooks.process_partial_name
        } else {
            &task.hooks.process_name
        };

        match hook {
            Some(process) => process(&self.path),
            None if self.is_partial => strip_marker(&self.base_name, &task.partial_regex),
            None => self.base_name.clone(),
        }
    }
}

/// Remove the partial marker from the start of `base_name`, e.g. the `_` of
/// `_header`. Markers matched anywhere else are kept.
fn strip_marker(base_name: &str, marker: &Regex) -> String {
    match marker.find(base_name) {
        Some(m) if m.start() == 0 && m.end() > 0 && m.end() < base_name.len() => {
            base_name[m.end()..].to_string()
        }
        _ => base_name.to_string(),
    }
}

/// List the templates directly inside the task's input directory.
///
/// Only regular files matching one of the task's patterns are returned;
/// directories, symlinks and other special entries are skipped. The result is
/// sorted by file name so the output does not depend on the platform's
/// directory listing order.
pub fn classify(task: &Task) -> Result<Vec<TemplateFile>, TaskError> {
    let input_dir = &task.input_dir;
    let entries = fs::read_dir(input_dir).map_err(|e| TaskError::InputDir(input_dir.clone(), e))?;

    let partials_dir = task.partials_path_regex.is_match(input_dir.as_str());
    let mut files = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| TaskError::InputDir(input_dir.clone(), e))?;

        let file_name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                tracing::warn!("Skipping non UTF-8 file name {:?}", name);
                continue;
            }
        };

        if !task.patterns.iter().any(|p| p.matches(&file_name)) {
            continue;
        }

        let path = input_dir.join(&file_name);
        let file_type = entry
            .file_type()
            .map_err(|e| TaskError::Read(path.clone(), e))?;

        if !file_type.is_file() {
            tracing::debug!("Skipping {}, not a regular file", path);
            continue;
        }

        let base_name = match file_name.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => file_name.as_str(),
        };

        if base_name.is_empty() {
            tracing::warn!("Skipping {}, empty template name", path);
            continue;
        }

        let is_partial = partials_dir && task.partial_regex.is_match(&file_name);

        files.push(TemplateFile {
            base_name: base_name.to_string(),
            path,
            is_partial,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(files)
}
