//! Assembly of the generated JavaScript.
//!
//! An output file is a preamble, one fragment per compiled template and a
//! closer. Every statement is followed by the task separator; only the final
//! `});` / `};` of a module wrapper is not.
//!
//! With [`WrapScope::Output`] the module wrapper is opened in the preamble
//! and closed in the closer. With [`WrapScope::Template`] every fragment
//! carries its own wrapper and the preamble and closer hold no module code.

use crate::compiler::Compiled;
use crate::config::{AmdTarget, ModuleFormat, Task, WrapScope};
use crate::namespace::{Namespace, Registry, Resolved, quote};

/// Everything known about one compiled template file.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub name: &'a str,
    pub is_partial: bool,
    pub compiled: &'a Compiled,
    /// Namespace of the template, `None` when no namespace applies.
    pub resolved: Option<&'a Resolved>,
}

/// Text written when the output file is created.
///
/// A fixed namespace is declared here, so that it exists (and can be
/// returned by a module wrapper) even when no template gets compiled.
pub fn preamble(task: &Task, registry: &mut Registry) -> String {
    let mut out = task.banner.clone();

    if task.scope == WrapScope::Output {
        let stem = task
            .output_file
            .file_stem()
            .unwrap_or(task.output_file.as_str());
        let target = AmdTarget {
            name: stem,
            ast: None,
            compiled: None,
        };

        if let Some(open) = wrapper_open(task, &target) {
            push(&mut out, &open, &task.separator);
        }

        if let Namespace::Path(path) = &task.namespace {
            for declaration in registry.declare(path).declarations {
                push(&mut out, &declaration, &task.separator);
            }
        }
    }

    out
}

/// Text of one template: new namespace declarations first, then the partial
/// registration or template assignment.
pub fn assemble(task: &Task, registry: &Registry, entry: &Entry) -> String {
    let mut statements = Vec::new();

    if let Some(resolved) = entry.resolved {
        statements.extend(resolved.declarations.iter().cloned());
    }

    statements.push(if entry.is_partial {
        register_partial(task, entry)
    } else {
        assign_template(task, entry)
    });

    let mut out = String::new();

    match task.scope {
        WrapScope::Output => {
            for statement in &statements {
                push(&mut out, statement, &task.separator);
            }
        }
        WrapScope::Template => {
            let target = AmdTarget {
                name: entry.name,
                ast: entry.compiled.ast.as_ref(),
                compiled: Some(&entry.compiled.body),
            };
            let open = wrapper_open(task, &target);

            if let Some(open) = &open {
                push(&mut out, open, &task.separator);
            }
            for statement in &statements {
                push(&mut out, statement, &task.separator);
            }
            if open.is_some() {
                out.push_str(&wrapper_close(task, registry));
                out.push_str(&task.separator);
            }
        }
    }

    out
}

/// Whether every fragment is a module of its own. Such fragments can't rely
/// on declarations made by the ones before them and need a fresh
/// [`Registry`] each.
pub fn is_isolated(task: &Task) -> bool {
    task.scope == WrapScope::Template && !matches!(task.format, ModuleFormat::Global)
}

/// Text appended after the last template.
pub fn closer(task: &Task, registry: &Registry) -> String {
    match task.scope {
        WrapScope::Output => wrapper_close(task, registry),
        WrapScope::Template => String::new(),
    }
}

fn register_partial(task: &Task, entry: &Entry) -> String {
    let name = quote(entry.name);
    let body = &entry.compiled.body;

    match entry.resolved {
        Some(resolved) if task.partials_use_namespace => format!(
            "{}.registerPartial({name}, {}[{name}] = {body});",
            task.runtime, resolved.expr
        ),
        _ => format!("{}.registerPartial({name}, {body});", task.runtime),
    }
}

fn assign_template(task: &Task, entry: &Entry) -> String {
    let body = &entry.compiled.body;

    match (entry.resolved, &task.format) {
        (Some(resolved), _) => format!("{}[{}] = {body};", resolved.expr, quote(entry.name)),
        (None, ModuleFormat::Amd(_) | ModuleFormat::CommonJs) => format!("return {body};"),
        (None, ModuleFormat::Global) => format!("{body};"),
    }
}

fn wrapper_open(task: &Task, target: &AmdTarget) -> Option<String> {
    match &task.format {
        ModuleFormat::Global => None,
        ModuleFormat::Amd(deps) => {
            let deps = deps
                .dependencies(target)
                .iter()
                .map(|dep| single_quote(dep))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("define([{deps}], function({}) {{", task.runtime))
        }
        ModuleFormat::CommonJs => Some(format!("module.exports = function({}) {{", task.runtime)),
    }
}

fn wrapper_close(task: &Task, registry: &Registry) -> String {
    let end = match task.format {
        ModuleFormat::Global => return String::new(),
        ModuleFormat::Amd(_) => "});",
        ModuleFormat::CommonJs => "};",
    };

    let mut out = String::new();
    if task.namespace.is_enabled()
        && let Some(root) = registry.global_root()
    {
        push(&mut out, &format!("return {root};"), &task.separator);
    }
    out.push_str(end);
    out
}

fn push(out: &mut String, statement: &str, separator: &str) {
    out.push_str(statement);
    out.push_str(separator);
}

fn single_quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}
