use camino::Utf8PathBuf;
use thiserror::Error;

/// Top level error returned by [`crate::Precompiler`].
#[derive(Debug, Error)]
pub enum PrecompileError {
    #[error("Invalid configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Task '{0}':\n{1}")]
    Task(String, TaskError),

    #[error("Failed to build the worker pool.\n{0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Rejected option combinations, reported before any file is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse config file.\n{0}")]
    Parse(#[from] toml::de::Error),

    #[error("Option '{0}' must not be empty")]
    Empty(&'static str),

    #[error("Option '{0}' is not a valid regular expression.\n{1}")]
    Regex(&'static str, regex::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Invalid namespace '{0}': {1}")]
    Namespace(String, NamespaceError),

    #[error("Options 'amd' and 'commonjs' are mutually exclusive")]
    ModuleFormat,

    #[error("AMD dependency list must not be empty or contain empty names")]
    AmdDependencies,

    #[error("More than one task writes to '{0}'")]
    DuplicateOutput(Utf8PathBuf),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("path is empty")]
    Empty,

    #[error("segment {0} is empty")]
    EmptySegment(usize),

    #[error("unterminated bracket at byte {0}")]
    Unterminated(usize),
}

/// Errors fatal to a single task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Couldn't read input directory '{0}'.\n{1}")]
    InputDir(Utf8PathBuf, std::io::Error),

    #[error("Couldn't create output directory '{0}'.\n{1}")]
    OutputDir(Utf8PathBuf, std::io::Error),

    #[error("Couldn't read template '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't write to '{0}'.\n{1}")]
    Write(Utf8PathBuf, std::io::Error),
}

/// Errors produced while compiling a single template. These never abort a
/// task; the file is skipped and a warning is logged.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Syntax(String),

    #[error("Couldn't run the template compiler.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Compiler output is not valid UTF-8.\n{0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Couldn't (de)serialize compiler data.\n{0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid namespace '{0}': {1}")]
    Namespace(String, NamespaceError),
}
