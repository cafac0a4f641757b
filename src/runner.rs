//! Execution of a single task: list, compile and append every template to
//! the task's output file, in order.

use std::fs;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::classify::{TemplateFile, classify};
use crate::compiler::{TemplateCompiler, compile};
use crate::config::{ModuleFormat, Task, WrapScope};
use crate::error::{CompileError, TaskError};
use crate::io::{OutputStream, STYLE_FILES, ensure_dir};
use crate::module::{self, Entry};
use crate::namespace::Registry;

/// Outcome of one successfully finished task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub output: Utf8PathBuf,
    pub templates: usize,
    pub partials: usize,
    /// Files that could not be read or compiled and were left out.
    pub skipped: Vec<Utf8PathBuf>,
    pub duration: Duration,
}

/// Run one task to completion.
///
/// Listing the input directory, creating the output directory and writing
/// the output file are fatal. A template that cannot be read or fails to
/// compile is logged and left out of the output.
pub fn run_task(task: &Task, compiler: &dyn TemplateCompiler) -> Result<TaskReport, TaskError> {
    let start = Instant::now();

    let files = classify(task)?;
    tracing::info!("Found {} templates in {}", files.len(), task.input_dir);

    let span = Span::current();
    span.pb_set_style(&STYLE_FILES);
    span.pb_set_length(files.len() as u64);
    span.pb_set_message(task.input_dir.as_str());

    ensure_dir(&task.output_dir)?;

    let mut registry = Registry::new();
    let mut stream = OutputStream::create(task.output_path())?;
    stream.append(&module::preamble(task, &mut registry))?;

    let mut templates = 0;
    let mut partials = 0;
    let mut skipped = Vec::new();

    for file in &files {
        let source = match read_source(file) {
            Ok(source) => source,
            Err(err) => {
                tracing::warn!("Skipping {}: {}", file.path, err);
                skipped.push(file.path.clone());
                span.pb_inc(1);
                continue;
            }
        };

        // Every wrapped fragment is a module of its own and has to declare
        // its namespace again.
        let mut isolated = Registry::new();
        let registry = if module::is_isolated(task) {
            &mut isolated
        } else {
            &mut registry
        };

        match render(task, compiler, registry, file, &source) {
            Ok(fragment) => {
                stream.append(&fragment)?;
                if file.is_partial {
                    partials += 1;
                } else {
                    templates += 1;
                }
                tracing::debug!("Compiled {}", file.path);
            }
            Err(err) => {
                tracing::warn!("Skipping {}: {}", file.path, err);
                skipped.push(file.path.clone());
            }
        }

        span.pb_inc(1);
    }

    if templates > 1
        && !task.namespace.is_enabled()
        && task.scope == WrapScope::Output
        && !matches!(task.format, ModuleFormat::Global)
    {
        tracing::warn!(
            "{} templates without a namespace share one module wrapper, only the first is returned",
            templates
        );
    }

    let output = stream.close(&module::closer(task, &registry))?;

    tracing::info!(
        "Precompiled {} templates and {} partials from {} to {}",
        templates,
        partials,
        task.input_dir,
        output
    );

    Ok(TaskReport {
        output,
        templates,
        partials,
        skipped,
        duration: start.elapsed(),
    })
}

/// Read a template as text. Invalid UTF-8 sequences are replaced rather than
/// rejected.
fn read_source(file: &TemplateFile) -> Result<String, TaskError> {
    let bytes = fs::read(&file.path).map_err(|e| TaskError::Read(file.path.clone(), e))?;

    match String::from_utf8(bytes) {
        Ok(source) => Ok(source),
        Err(err) => {
            tracing::warn!("{} is not valid UTF-8, invalid bytes replaced", file.path);
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
    }
}

/// Compile one file and assemble its fragment. Namespaces are only declared
/// once the template compiled.
fn render(
    task: &Task,
    compiler: &dyn TemplateCompiler,
    registry: &mut Registry,
    file: &TemplateFile,
    source: &str,
) -> Result<String, CompileError> {
    let compiled = compile(source, &file.path, task, compiler)?;
    let name = file.name(task);

    let resolved = if file.is_partial && !task.partials_use_namespace {
        None
    } else {
        task.namespace
            .resolve(&file.path, registry)
            .map_err(|(raw, e)| CompileError::Namespace(raw, e))?
    };

    let entry = Entry {
        name: &name,
        is_partial: file.is_partial,
        compiled: &compiled,
        resolved: resolved.as_ref(),
    };

    Ok(module::assemble(task, registry, &entry))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8Path;

    use super::*;
    use crate::compiler::testing::FakeCompiler;
    use crate::config::{AmdOption, Hooks, NamespaceOption, TaskConfig};

    struct Fixture {
        _dir: tempfile::TempDir,
        root: Utf8PathBuf,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
            fs::create_dir(root.join("templates")).unwrap();
            for (name, content) in files {
                fs::write(root.join("templates").join(name), content).unwrap();
            }
            Self { _dir: dir, root }
        }

        fn config(&self) -> TaskConfig {
            TaskConfig {
                input_dir: self.root.join("templates"),
                output_dir: self.root.join("dist/js"),
                ..Default::default()
            }
        }

        fn run(&self, config: TaskConfig, hooks: Hooks) -> (TaskReport, String) {
            let task = Task::new(config, hooks).unwrap();
            let report = run_task(&task, &FakeCompiler).unwrap();
            let text = fs::read_to_string(&report.output).unwrap();
            (report, text)
        }
    }

    #[test]
    fn test_global_output() {
        let fixture = Fixture::new(&[
            ("b.hbs", "B {{x}}"),
            ("a.hbs", "A"),
            ("_nav.hbs", "N"),
            ("notes.txt", "ignored"),
        ]);
        let (report, text) = fixture.run(fixture.config(), Hooks::new());

        assert_eq!(report.templates, 2);
        assert_eq!(report.partials, 1);
        assert!(report.skipped.is_empty());
        assert_eq!(report.output, fixture.root.join("dist/js/compiled-templates.js"));
        assert_eq!(
            text,
            concat!(
                "this[\"JST\"] = this[\"JST\"] || {};\n\n",
                "Handlebars.registerPartial(\"nav\", Handlebars.template({\"main\":\"N\"}));\n\n",
                "this[\"JST\"][\"a\"] = Handlebars.template({\"main\":\"A\"});\n\n",
                "this[\"JST\"][\"b\"] = Handlebars.template({\"main\":\"B {{x}}\"});\n\n",
            )
        );
    }

    #[test]
    fn test_only_partials() {
        let fixture = Fixture::new(&[("_a.hbs", "a"), ("_b.handlebars", "b")]);
        let (report, text) = fixture.run(fixture.config(), Hooks::new());

        assert_eq!(report.templates, 0);
        assert_eq!(report.partials, 2);
        assert_eq!(text.matches("registerPartial").count(), 2);
        assert!(!text.contains("this[\"JST\"][\""));
    }

    #[test]
    fn test_shared_namespace_declared_once() {
        let fixture = Fixture::new(&[("a.hbs", "a"), ("b.hbs", "b"), ("c.hbs", "c")]);
        let config = TaskConfig {
            namespace: NamespaceOption::Path("A.B".into()),
            ..fixture.config()
        };
        let (_, text) = fixture.run(config, Hooks::new());

        assert_eq!(text.matches(r#"this["A"] = this["A"] || {};"#).count(), 1);
        assert_eq!(text.matches(r#"this["A"]["B"] = this["A"]["B"] || {};"#).count(), 1);
        assert_eq!(text.matches(r#"this["A"]["B"]["#).count(), 3);
    }

    #[test]
    fn test_dynamic_namespace_declared_once() {
        let fixture = Fixture::new(&[
            ("admin_list.hbs", "a"),
            ("admin_edit.hbs", "b"),
            ("site_home.hbs", "c"),
        ]);
        let hooks = Hooks::new().namespace(|path| {
            let stem = path.file_stem().unwrap_or_default();
            let (area, _) = stem.split_once('_').unwrap_or((stem, ""));
            format!("App.{area}")
        });
        let config = TaskConfig {
            amd: AmdOption::Flag(true),
            ..fixture.config()
        };
        let (_, text) = fixture.run(config, hooks);

        assert_eq!(text.matches(r#"this["App"] = this["App"] || {};"#).count(), 1);
        let admin = r#"this["App"]["admin"] = this["App"]["admin"] || {};"#;
        assert_eq!(text.matches(admin).count(), 1);
        assert!(text.contains(r#"this["App"]["site"]["site_home"] = "#));
        assert!(text.ends_with("return this[\"App\"];\n\n});"));
    }

    #[test]
    fn test_bad_template_skipped() {
        let fixture = Fixture::new(&[
            ("good.hbs", "ok"),
            ("bad.hbs", "{{#if x}}unbalanced"),
            ("good2.hbs", "{{#each y}}ok{{/each}}"),
        ]);
        let (report, text) = fixture.run(fixture.config(), Hooks::new());

        assert_eq!(report.templates, 2);
        assert_eq!(report.skipped, [fixture.root.join("templates/bad.hbs")]);
        assert!(text.contains(r#"this["JST"]["good"]"#));
        assert!(text.contains(r#"this["JST"]["good2"]"#));
        assert!(!text.contains(r#"this["JST"]["bad"]"#));
    }

    #[test]
    fn test_invalid_dynamic_namespace_skipped() {
        let fixture = Fixture::new(&[("a.hbs", "a"), ("b.hbs", "b")]);
        let hooks = Hooks::new().namespace(|path| {
            if path.file_stem() == Some("a") {
                "App..broken".into()
            } else {
                "App".into()
            }
        });
        let (report, text) = fixture.run(fixture.config(), hooks);

        assert_eq!(report.templates, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(text.starts_with(r#"this["App"] = this["App"] || {};"#));
    }

    #[test]
    fn test_amd_list_wrapper() {
        let fixture = Fixture::new(&[("a.hbs", "a"), ("b.hbs", "b")]);
        let config = TaskConfig {
            amd: AmdOption::List(vec!["foo".into(), "bar".into()]),
            ..fixture.config()
        };
        let (_, text) = fixture.run(config, Hooks::new());

        assert!(text.starts_with("define(['foo', 'bar'], function(Handlebars) {\n\n"));
        assert_eq!(text.matches("define(").count(), 1);
        assert!(text.ends_with("return this[\"JST\"];\n\n});"));
    }

    #[test]
    fn test_empty_input() {
        let fixture = Fixture::new(&[("readme.md", "nothing here")]);
        let config = TaskConfig {
            commonjs: true,
            ..fixture.config()
        };
        let (report, text) = fixture.run(config, Hooks::new());

        assert_eq!(report.templates + report.partials, 0);
        assert_eq!(
            text,
            concat!(
                "module.exports = function(Handlebars) {\n\n",
                "this[\"JST\"] = this[\"JST\"] || {};\n\n",
                "return this[\"JST\"];\n\n",
                "};",
            )
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let fixture = Fixture::new(&[("a.hbs", "ok"), ("c.hbs", "ok")]);
        fs::write(fixture.root.join("templates/b.hbs"), b"caf\xe9").unwrap();
        let (report, text) = fixture.run(fixture.config(), Hooks::new());

        assert_eq!(report.templates, 3);
        assert!(report.skipped.is_empty());
        let replaced = "this[\"JST\"][\"b\"] = Handlebars.template({\"main\":\"caf\u{fffd}\"});";
        assert!(text.contains(replaced));
        assert!(text.contains(r#"this["JST"]["c"]"#));
    }

    #[test]
    fn test_read_failure_is_recoverable() {
        let fixture = Fixture::new(&[]);
        fs::create_dir(fixture.root.join("templates/dir.hbs")).unwrap();
        let file = TemplateFile {
            path: fixture.root.join("templates/dir.hbs"),
            base_name: "dir".into(),
            is_partial: false,
        };
        assert!(matches!(read_source(&file), Err(TaskError::Read(_, _))));
    }

    #[test]
    fn test_template_scope_declares_per_module() {
        let fixture = Fixture::new(&[("a.hbs", "a"), ("b.hbs", "b")]);
        let config = TaskConfig {
            commonjs: true,
            scope: WrapScope::Template,
            ..fixture.config()
        };
        let (_, text) = fixture.run(config, Hooks::new());

        let modules: Vec<_> = text.split("module.exports = ").skip(1).collect();
        assert_eq!(modules.len(), 2);
        for (module, name) in modules.iter().zip(["a", "b"]) {
            assert!(module.contains(r#"this["JST"] = this["JST"] || {};"#));
            assert!(module.contains(&format!(r#"this["JST"]["{name}"] = "#)));
            assert!(module.contains("return this[\"JST\"];\n\n};"));
        }
    }

    #[test]
    fn test_idempotent() {
        let fixture = Fixture::new(&[("x.hbs", "x"), ("_p.hbs", "p"), ("m.hbs", "m")]);
        let (_, first) = fixture.run(fixture.config(), Hooks::new());
        let (_, second) = fixture.run(fixture.config(), Hooks::new());
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_input_dir_is_fatal() {
        let fixture = Fixture::new(&[]);
        let config = TaskConfig {
            input_dir: fixture.root.join("nope"),
            ..fixture.config()
        };
        let task = Task::try_from(config).unwrap();
        let err = run_task(&task, &FakeCompiler).unwrap_err();
        assert!(matches!(err, TaskError::InputDir(_, _)));
        assert!(!task.output_path().exists());
    }

    #[test]
    fn test_output_dir_failure_is_fatal() {
        let fixture = Fixture::new(&[("a.hbs", "a")]);
        fs::write(fixture.root.join("blocker"), "").unwrap();
        let config = TaskConfig {
            output_dir: fixture.root.join("blocker/js"),
            ..fixture.config()
        };
        let task = Task::try_from(config).unwrap();
        let err = run_task(&task, &FakeCompiler).unwrap_err();
        assert!(matches!(err, TaskError::OutputDir(_, _)));
    }
}
