//! Task configuration.
//!
//! [`TaskConfig`] is the raw, partially specified form, deserializable from a
//! TOML `[[task]]` table. [`Task`] is the validated form the pipeline runs
//! on: regular expressions and glob patterns are compiled, the namespace and
//! the AMD option are resolved into tagged enums once.

use std::fmt::Debug;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use regex::Regex;
use serde::Deserialize;

use crate::compiler::{Ast, CompilerOptions};
use crate::error::ConfigError;
use crate::namespace::{Namespace, NamespaceFn};

pub const DEFAULT_NAMESPACE: &str = "JST";

/// A namespace as written in a config file: a path, or `false` to disable
/// namespacing (`true` selects [`DEFAULT_NAMESPACE`]).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NamespaceOption {
    Flag(bool),
    Path(String),
}

impl Default for NamespaceOption {
    fn default() -> Self {
        NamespaceOption::Path(DEFAULT_NAMESPACE.to_string())
    }
}

/// The `amd` option as written in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AmdOption {
    Flag(bool),
    Module(String),
    List(Vec<String>),
}

impl Default for AmdOption {
    fn default() -> Self {
        AmdOption::Flag(false)
    }
}

/// How many times the module wrapper is emitted per output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapScope {
    /// One wrapper around the whole output file.
    #[default]
    Output,
    /// One wrapper around every template fragment.
    Template,
}

/// Raw task options. Every field is optional in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskConfig {
    pub input_dir: Utf8PathBuf,
    pub output_file: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub namespace: NamespaceOption,
    pub separator: String,
    pub banner: String,
    pub runtime: String,
    pub wrapped: bool,
    pub amd: AmdOption,
    pub commonjs: bool,
    pub scope: WrapScope,
    pub known_helpers: Vec<String>,
    pub known_helpers_only: bool,
    pub partials_path_regex: String,
    pub partial_regex: String,
    pub partials_use_namespace: bool,
    pub patterns: Vec<String>,
    pub compiler_options: serde_json::Map<String, serde_json::Value>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            input_dir: "templates".into(),
            output_file: "compiled-templates.js".into(),
            output_dir: "".into(),
            namespace: NamespaceOption::default(),
            separator: "\n\n".into(),
            banner: String::new(),
            runtime: "Handlebars".into(),
            wrapped: true,
            amd: AmdOption::default(),
            commonjs: false,
            scope: WrapScope::default(),
            known_helpers: Vec::new(),
            known_helpers_only: false,
            partials_path_regex: ".".into(),
            partial_regex: "^_".into(),
            partials_use_namespace: false,
            patterns: vec!["*.handlebars".into(), "*.hbs".into()],
            compiler_options: serde_json::Map::new(),
        }
    }
}

/// A whole config file: an ordered list of tasks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(rename = "task")]
    pub tasks: Vec<TaskConfig>,
}

impl ProjectConfig {
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;
        Self::parse(&contents)
    }
}

type ContentFn = Arc<dyn Fn(&str, &Utf8Path) -> String + Send + Sync>;
type NameFn = Arc<dyn Fn(&Utf8Path) -> String + Send + Sync>;
type AstFn = Arc<dyn Fn(Ast) -> Ast + Send + Sync>;
type AmdFn = Arc<dyn Fn(&AmdTarget) -> Vec<String> + Send + Sync>;

/// Extension points applied while compiling a task. Only available through
/// the API, not through config files.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) process_content: Option<ContentFn>,
    pub(crate) process_name: Option<NameFn>,
    pub(crate) process_partial_name: Option<NameFn>,
    pub(crate) process_ast: Option<AstFn>,
    pub(crate) namespace: Option<NamespaceFn>,
    pub(crate) amd: Option<AmdFn>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite template source before it is compiled.
    pub fn process_content<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Utf8Path) -> String + Send + Sync + 'static,
    {
        self.process_content = Some(Arc::new(f));
        self
    }

    /// Compute the name a template is assigned under.
    pub fn process_name<F>(mut self, f: F) -> Self
    where
        F: Fn(&Utf8Path) -> String + Send + Sync + 'static,
    {
        self.process_name = Some(Arc::new(f));
        self
    }

    /// Compute the name a partial is registered under.
    pub fn process_partial_name<F>(mut self, f: F) -> Self
    where
        F: Fn(&Utf8Path) -> String + Send + Sync + 'static,
    {
        self.process_partial_name = Some(Arc::new(f));
        self
    }

    /// Rewrite the parsed template before it is precompiled.
    pub fn process_ast<F>(mut self, f: F) -> Self
    where
        F: Fn(Ast) -> Ast + Send + Sync + 'static,
    {
        self.process_ast = Some(Arc::new(f));
        self
    }

    /// Compute the namespace per template file. Overrides `namespace`
    /// unless namespacing is disabled.
    pub fn namespace<F>(mut self, f: F) -> Self
    where
        F: Fn(&Utf8Path) -> String + Send + Sync + 'static,
    {
        self.namespace = Some(Arc::new(f));
        self
    }

    /// Compute the AMD dependency list. Overrides `amd`.
    pub fn amd<F>(mut self, f: F) -> Self
    where
        F: Fn(&AmdTarget) -> Vec<String> + Send + Sync + 'static,
    {
        self.amd = Some(Arc::new(f));
        self
    }
}

impl Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("process_content", &self.process_content.is_some())
            .field("process_name", &self.process_name.is_some())
            .field("process_partial_name", &self.process_partial_name.is_some())
            .field("process_ast", &self.process_ast.is_some())
            .field("namespace", &self.namespace.is_some())
            .field("amd", &self.amd.is_some())
            .finish()
    }
}

/// What a computed AMD dependency list is computed for.
///
/// With [`WrapScope::Template`] this is a single template and carries its
/// AST (when one was parsed) and compiled body. With [`WrapScope::Output`]
/// the wrapper is opened before any template is compiled, so `name` is the
/// output file stem and the other fields are empty.
#[derive(Debug)]
pub struct AmdTarget<'a> {
    pub name: &'a str,
    pub ast: Option<&'a Ast>,
    pub compiled: Option<&'a str>,
}

/// AMD dependency declaration, resolved once per task.
#[derive(Clone)]
pub enum AmdDeps {
    /// `define(['handlebars'], ...)`
    Handlebars,
    /// A single custom dependency name.
    Module(String),
    /// An explicit dependency list.
    List(Vec<String>),
    /// Computed from the wrapped target.
    Computed(AmdFn),
}

impl AmdDeps {
    pub fn dependencies(&self, target: &AmdTarget) -> Vec<String> {
        match self {
            AmdDeps::Handlebars => vec!["handlebars".into()],
            AmdDeps::Module(name) => vec![name.clone()],
            AmdDeps::List(list) => list.clone(),
            AmdDeps::Computed(f) => f(target),
        }
    }
}

impl Debug for AmdDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmdDeps::Handlebars => write!(f, "AmdDeps::Handlebars"),
            AmdDeps::Module(name) => write!(f, "AmdDeps::Module({name:?})"),
            AmdDeps::List(list) => write!(f, "AmdDeps::List({list:?})"),
            AmdDeps::Computed(_) => write!(f, "AmdDeps::Computed(*)"),
        }
    }
}

/// Module format of the generated file.
#[derive(Debug, Clone)]
pub enum ModuleFormat {
    Global,
    Amd(AmdDeps),
    CommonJs,
}

/// A validated unit of work: one input directory compiled into one output
/// file.
#[derive(Debug, Clone)]
pub struct Task {
    pub input_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub output_file: Utf8PathBuf,
    pub namespace: Namespace,
    pub separator: String,
    pub banner: String,
    pub runtime: String,
    pub wrapped: bool,
    pub format: ModuleFormat,
    pub scope: WrapScope,
    pub partials_path_regex: Regex,
    pub partial_regex: Regex,
    pub partials_use_namespace: bool,
    pub patterns: Vec<Pattern>,
    pub compiler_options: CompilerOptions,
    pub hooks: Hooks,
}

impl Task {
    /// Validate `config` and combine it with `hooks`.
    pub fn new(config: TaskConfig, hooks: Hooks) -> Result<Self, ConfigError> {
        if config.input_dir.as_str().is_empty() {
            return Err(ConfigError::Empty("input_dir"));
        }
        if config.output_file.as_str().is_empty() {
            return Err(ConfigError::Empty("output_file"));
        }
        if config.runtime.trim().is_empty() {
            return Err(ConfigError::Empty("runtime"));
        }
        if config.patterns.is_empty() {
            return Err(ConfigError::Empty("patterns"));
        }

        let namespace = match (&config.namespace, &hooks.namespace) {
            (NamespaceOption::Flag(false), _) => Namespace::Disabled,
            (_, Some(f)) => Namespace::Dynamic(f.clone()),
            (NamespaceOption::Flag(true), None) => Namespace::path(DEFAULT_NAMESPACE)
                .map_err(|e| ConfigError::Namespace(DEFAULT_NAMESPACE.into(), e))?,
            (NamespaceOption::Path(path), None) => {
                Namespace::path(path).map_err(|e| ConfigError::Namespace(path.clone(), e))?
            }
        };

        let amd = match (&config.amd, &hooks.amd) {
            (_, Some(f)) => Some(AmdDeps::Computed(f.clone())),
            (AmdOption::Flag(false), None) => None,
            (AmdOption::Flag(true), None) => Some(AmdDeps::Handlebars),
            (AmdOption::Module(name), None) => {
                if name.trim().is_empty() {
                    return Err(ConfigError::AmdDependencies);
                }
                Some(AmdDeps::Module(name.clone()))
            }
            (AmdOption::List(list), None) => {
                if list.is_empty() || list.iter().any(|name| name.trim().is_empty()) {
                    return Err(ConfigError::AmdDependencies);
                }
                Some(AmdDeps::List(list.clone()))
            }
        };

        let format = match (amd, config.commonjs) {
            (Some(_), true) => return Err(ConfigError::ModuleFormat),
            (Some(deps), false) => ModuleFormat::Amd(deps),
            (None, true) => ModuleFormat::CommonJs,
            (None, false) => ModuleFormat::Global,
        };

        let partials_path_regex = Regex::new(&config.partials_path_regex)
            .map_err(|e| ConfigError::Regex("partials_path_regex", e))?;
        let partial_regex =
            Regex::new(&config.partial_regex).map_err(|e| ConfigError::Regex("partial_regex", e))?;

        let patterns = config
            .patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            input_dir: config.input_dir,
            output_dir: config.output_dir,
            output_file: config.output_file,
            namespace,
            separator: config.separator,
            banner: config.banner,
            runtime: config.runtime,
            wrapped: config.wrapped,
            format,
            scope: config.scope,
            partials_path_regex,
            partial_regex,
            partials_use_namespace: config.partials_use_namespace,
            patterns,
            compiler_options: CompilerOptions {
                known_helpers: config.known_helpers,
                known_helpers_only: config.known_helpers_only,
                extra: config.compiler_options,
            },
            hooks,
        })
    }

    /// Destination of the generated file.
    pub fn output_path(&self) -> Utf8PathBuf {
        self.output_dir.join(&self.output_file)
    }

    /// Short human readable name used in logs and errors.
    pub fn name(&self) -> String {
        format!("{} -> {}", self.input_dir, self.output_path())
    }
}

impl TryFrom<TaskConfig> for Task {
    type Error = ConfigError;

    fn try_from(config: TaskConfig) -> Result<Self, Self::Error> {
        Task::new(config, Hooks::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let task = Task::try_from(TaskConfig::default()).unwrap();
        assert_eq!(task.input_dir, "templates");
        assert_eq!(task.output_path(), "compiled-templates.js");
        assert_eq!(task.separator, "\n\n");
        assert!(task.wrapped);
        assert!(matches!(task.format, ModuleFormat::Global));
        assert_eq!(task.scope, WrapScope::Output);
        match &task.namespace {
            Namespace::Path(path) => assert_eq!(path.expr(), r#"this["JST"]"#),
            other => panic!("unexpected namespace {other:?}"),
        }
        assert!(task.partial_regex.is_match("_header.hbs"));
        assert!(!task.partial_regex.is_match("header.hbs"));
    }

    #[test]
    fn test_from_toml() {
        let config = ProjectConfig::parse(
            r#"
            [[task]]
            input_dir = "app/templates"
            output_dir = "public/js"
            namespace = "App.Templates"
            amd = ["handlebars.runtime", "helpers"]
            known_helpers = ["t"]

            [[task]]
            input_dir = "admin"
            namespace = false
            commonjs = true
            scope = "template"
            "#,
        )
        .unwrap();

        assert_eq!(config.tasks.len(), 2);

        let first = &config.tasks[0];
        assert_eq!(first.input_dir, "app/templates");
        assert_eq!(first.output_file, "compiled-templates.js");
        assert_eq!(
            first.amd,
            AmdOption::List(vec!["handlebars.runtime".into(), "helpers".into()])
        );
        assert_eq!(first.known_helpers, ["t"]);

        let second = &config.tasks[1];
        assert_eq!(second.namespace, NamespaceOption::Flag(false));
        assert!(second.commonjs);
        assert_eq!(second.scope, WrapScope::Template);

        let task = Task::try_from(first.clone()).unwrap();
        assert_eq!(task.output_path(), "public/js/compiled-templates.js");
        match task.format {
            ModuleFormat::Amd(AmdDeps::List(list)) => assert_eq!(list.len(), 2),
            other => panic!("unexpected format {other:?}"),
        }
    }

    #[test]
    fn test_unknown_option_rejected() {
        let err = ProjectConfig::parse("[[task]]\nnamepsace = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_amd_variants() {
        let resolve = |amd| {
            let config = TaskConfig {
                amd,
                ..Default::default()
            };
            Task::try_from(config).map(|task| task.format)
        };

        let target = AmdTarget {
            name: "x",
            ast: None,
            compiled: None,
        };

        match resolve(AmdOption::Flag(true)).unwrap() {
            ModuleFormat::Amd(deps) => assert_eq!(deps.dependencies(&target), ["handlebars"]),
            other => panic!("unexpected format {other:?}"),
        }
        match resolve(AmdOption::Module("hbs".into())).unwrap() {
            ModuleFormat::Amd(deps) => assert_eq!(deps.dependencies(&target), ["hbs"]),
            other => panic!("unexpected format {other:?}"),
        }
        assert!(matches!(
            resolve(AmdOption::List(vec![])),
            Err(ConfigError::AmdDependencies)
        ));
        assert!(matches!(
            resolve(AmdOption::Module(" ".into())),
            Err(ConfigError::AmdDependencies)
        ));
    }

    #[test]
    fn test_amd_hook_overrides_option() {
        let hooks = Hooks::new().amd(|target| vec![format!("deps/{}", target.name)]);
        let task = Task::new(TaskConfig::default(), hooks).unwrap();
        let target = AmdTarget {
            name: "list",
            ast: None,
            compiled: None,
        };
        match task.format {
            ModuleFormat::Amd(deps) => assert_eq!(deps.dependencies(&target), ["deps/list"]),
            other => panic!("unexpected format {other:?}"),
        }
    }

    #[test]
    fn test_invalid_combinations() {
        let config = TaskConfig {
            amd: AmdOption::Flag(true),
            commonjs: true,
            ..Default::default()
        };
        assert!(matches!(Task::try_from(config), Err(ConfigError::ModuleFormat)));

        let config = TaskConfig {
            namespace: NamespaceOption::Path("App..Views".into()),
            ..Default::default()
        };
        assert!(matches!(
            Task::try_from(config),
            Err(ConfigError::Namespace(_, _))
        ));

        let config = TaskConfig {
            partial_regex: "(".into(),
            ..Default::default()
        };
        assert!(matches!(
            Task::try_from(config),
            Err(ConfigError::Regex("partial_regex", _))
        ));

        let config = TaskConfig {
            input_dir: "".into(),
            ..Default::default()
        };
        assert!(matches!(
            Task::try_from(config),
            Err(ConfigError::Empty("input_dir"))
        ));
    }

    #[test]
    fn test_namespace_hook_respects_disabled() {
        let hooks = Hooks::new().namespace(|_| "X".into());

        let task = Task::new(TaskConfig::default(), hooks.clone()).unwrap();
        assert!(matches!(task.namespace, Namespace::Dynamic(_)));

        let config = TaskConfig {
            namespace: NamespaceOption::Flag(false),
            ..Default::default()
        };
        let task = Task::new(config, hooks).unwrap();
        assert!(matches!(task.namespace, Namespace::Disabled));
    }
}
