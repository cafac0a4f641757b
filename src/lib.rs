#![forbid(unsafe_code)]
//! Build-time precompiler for Handlebars templates.
//!
//! Every [`Task`] scans one directory for template files, precompiles each
//! of them and concatenates the results into a single JavaScript file, which
//! can register the templates on a global namespace, or be wrapped as an AMD
//! or CommonJS module.
//!
//! ```no_run
//! use hbs_precompile::{Precompiler, TaskConfig};
//!
//! let config = TaskConfig {
//!     input_dir: "app/templates".into(),
//!     output_dir: "public/js".into(),
//!     ..Default::default()
//! };
//!
//! let summary = Precompiler::from_configs(vec![config])?.run()?;
//! println!("{} templates", summary.templates());
//! # Ok::<(), hbs_precompile::PrecompileError>(())
//! ```

mod classify;
mod compiler;
mod config;
mod error;
mod io;
mod module;
mod namespace;
mod runner;

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use console::style;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

pub use crate::classify::{TemplateFile, classify};
pub use crate::compiler::{
    Ast, Compiled, CompilerOptions, DenoCompiler, Source, TemplateCompiler, compile,
};
pub use crate::config::{
    AmdDeps, AmdOption, AmdTarget, Hooks, ModuleFormat, NamespaceOption, ProjectConfig, Task,
    TaskConfig, WrapScope,
};
pub use crate::error::*;
#[cfg(feature = "logging")]
pub use crate::io::init_logging;
pub use crate::namespace::{Namespace, NamespacePath, Registry, Resolved};
pub use crate::runner::{TaskReport, run_task};

/// Build phases a host can attach work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Sources are compiled into build artifacts.
    Compile,
}

/// Completion callback handed to a phase hook. Must be called exactly once.
pub type Done = Box<dyn FnOnce(Result<(), PrecompileError>) + Send>;

/// Work registered for a build phase.
pub type PhaseHook = Box<dyn FnOnce(Done) + Send>;

/// A build pipeline the precompiler can plug into.
pub trait BuildHost {
    fn register(&mut self, phase: Phase, hook: PhaseHook);
}

/// Reports of every task of a finished run, in task order.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub reports: Vec<TaskReport>,
}

impl Summary {
    pub fn templates(&self) -> usize {
        self.reports.iter().map(|r| r.templates).sum()
    }

    pub fn partials(&self) -> usize {
        self.reports.iter().map(|r| r.partials).sum()
    }

    pub fn skipped(&self) -> usize {
        self.reports.iter().map(|r| r.skipped.len()).sum()
    }
}

/// A set of validated tasks together with the compiler they run with.
#[derive(Clone)]
pub struct Precompiler {
    tasks: Vec<Task>,
    compiler: Arc<dyn TemplateCompiler>,
}

impl Precompiler {
    /// Tasks run with the default [`DenoCompiler`]. Every task must write
    /// to its own output file.
    pub fn new(tasks: Vec<Task>) -> Result<Self, PrecompileError> {
        let mut outputs = HashSet::new();
        for task in &tasks {
            let output = task.output_path();
            if !outputs.insert(output.clone()) {
                return Err(ConfigError::DuplicateOutput(output).into());
            }
        }

        Ok(Self {
            tasks,
            compiler: Arc::new(DenoCompiler::default()),
        })
    }

    /// Validate plain configurations, without hooks.
    pub fn from_configs(configs: Vec<TaskConfig>) -> Result<Self, PrecompileError> {
        let tasks = configs
            .into_iter()
            .map(Task::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(tasks)
    }

    pub fn with_compiler(mut self, compiler: impl TemplateCompiler + 'static) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Run every task, each on its own worker.
    ///
    /// A failing task does not stop the others; once all of them finished,
    /// the first error in task order is returned.
    pub fn run(&self) -> Result<Summary, PrecompileError> {
        let s = Instant::now();

        if self.tasks.is_empty() {
            tracing::info!("No tasks to run");
            return Ok(Summary::default());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.tasks.len())
            .thread_name(|i| format!("hbs-task-{i}"))
            .build()?;

        let root = tracing::span!(Level::INFO, "precompile");
        root.pb_set_style(&io::STYLE_TASKS);
        root.pb_set_length(self.tasks.len() as u64);
        root.pb_set_message("Precompiling templates...");
        let _enter = root.enter();

        let active = Mutex::new(HashSet::new());

        let results = pool.install(|| {
            self.tasks
                .par_iter()
                .map(|task| {
                    let name = task.name();
                    let span = tracing::span!(parent: &root, Level::INFO, "task", name = %name);
                    let _enter = span.enter();

                    {
                        let mut active = active.lock().unwrap();
                        active.insert(name.clone());
                        root.pb_set_message(&format_active(&active));
                    }

                    let result = run_task(task, self.compiler.as_ref())
                        .map_err(|err| PrecompileError::Task(name.clone(), err));

                    if let Err(err) = &result {
                        tracing::error!("{err}");
                    }

                    {
                        let mut active = active.lock().unwrap();
                        active.remove(&name);
                        root.pb_set_message(&format_active(&active));
                        root.pb_inc(1);
                    }

                    result
                })
                .collect::<Vec<_>>()
        });

        let reports = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        let summary = Summary { reports };

        tracing::info!(
            "Precompiled {} templates and {} partials, skipped {} {}",
            style(summary.templates()).green(),
            style(summary.partials()).green(),
            style(summary.skipped()).yellow(),
            io::as_overhead(s)
        );

        Ok(summary)
    }

    /// Attach the precompiler to the compile phase of `host`.
    pub fn apply(self, host: &mut dyn BuildHost) {
        host.register(
            Phase::Compile,
            Box::new(move |done: Done| done(self.run().map(|_| ()))),
        );
    }
}

impl Debug for Precompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Precompiler")
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

fn format_active(active: &HashSet<String>) -> String {
    const MAX: usize = 5;
    let mut names: Vec<_> = active.iter().cloned().collect();
    names.sort();

    if names.len() <= MAX {
        names.join(", ")
    } else {
        format!("{}… ({} total)", names[..MAX].join(", "), names.len())
    }
}
