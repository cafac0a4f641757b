//! Adapter around the Handlebars precompiler.
//!
//! Parsing and precompiling template syntax is not done in Rust. The
//! [`TemplateCompiler`] trait is the seam; [`DenoCompiler`] implements it by
//! running the `handlebars` npm package inside Deno.

use std::borrow::Cow;
use std::io::Write;
use std::process::{Command, Stdio};

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::Task;
use crate::error::CompileError;

/// A parsed template, as produced by `Handlebars.parse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ast(pub Value);

/// Options forwarded to the precompiler.
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    pub known_helpers: Vec<String>,
    pub known_helpers_only: bool,
    /// Any other precompiler option, passed through as is.
    pub extra: Map<String, Value>,
}

impl CompilerOptions {
    /// The options object handed to `Handlebars.precompile`.
    pub fn to_json(&self) -> Value {
        let mut options = self.extra.clone();

        if !self.known_helpers.is_empty() {
            let helpers = options
                .entry("knownHelpers")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(helpers) = helpers {
                for name in &self.known_helpers {
                    helpers.insert(name.clone(), Value::Bool(true));
                }
            }
        }

        if self.known_helpers_only {
            options.insert("knownHelpersOnly".into(), Value::Bool(true));
        }

        Value::Object(options)
    }
}

/// Input of a precompilation.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Text(&'a str),
    Ast(&'a Ast),
}

/// Something able to turn Handlebars source into a serialized template spec.
pub trait TemplateCompiler: Send + Sync {
    /// Parse template source into its AST.
    fn parse(&self, source: &str) -> Result<Ast, CompileError>;

    /// Precompile source or an AST into the JavaScript text of a template
    /// spec object.
    fn precompile(&self, input: Source<'_>, options: &CompilerOptions)
    -> Result<String, CompileError>;
}

/// Result of compiling one template file.
#[derive(Debug, Clone)]
pub struct Compiled {
    /// Template spec, wrapped in `<runtime>.template(...)` if requested.
    pub body: String,
    /// The AST, when one was parsed for the `process_ast` hook.
    pub ast: Option<Ast>,
}

/// Run one template through the task hooks and the compiler.
pub fn compile(
    source: &str,
    path: &Utf8Path,
    task: &Task,
    compiler: &dyn TemplateCompiler,
) -> Result<Compiled, CompileError> {
    let source = match &task.hooks.process_content {
        Some(process) => Cow::Owned(process(source, path)),
        None => Cow::Borrowed(source),
    };

    let (spec, ast) = match &task.hooks.process_ast {
        Some(process) => {
            let ast = process(compiler.parse(&source)?);
            let spec = compiler.precompile(Source::Ast(&ast), &task.compiler_options)?;
            (spec, Some(ast))
        }
        None => (
            compiler.precompile(Source::Text(&source), &task.compiler_options)?,
            None,
        ),
    };

    let body = if task.wrapped {
        format!("{}.template({spec})", task.runtime)
    } else {
        spec
    };

    Ok(Compiled { body, ast })
}

/// Precompiles templates with the `handlebars` npm package through Deno.
///
/// **Note:** This compiler requires the `deno` binary to be available in the
/// system PATH (or configured with [`DenoCompiler::binary`]).
#[derive(Debug, Clone)]
pub struct DenoCompiler {
    binary: String,
    package: String,
}

impl Default for DenoCompiler {
    fn default() -> Self {
        Self {
            binary: "deno".into(),
            package: "npm:handlebars@4.7.8".into(),
        }
    }
}

impl DenoCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the Deno executable.
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Module specifier the compiler is imported from.
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    fn script(&self) -> String {
        format!(
            r#"
            import Handlebars from "{}";

            const request = JSON.parse(await new Response(Deno.stdin.readable).text());

            const output = request.mode === "parse"
                ? JSON.stringify(Handlebars.parse(request.input))
                : Handlebars.precompile(request.input, request.options);

            await Deno.stdout.write(new TextEncoder().encode(output));
            "#,
            self.package
        )
    }

    fn run(&self, request: &Value) -> Result<String, CompileError> {
        let mut child = Command::new(&self.binary)
            .arg("eval")
            .arg("--quiet")
            .arg(self.script())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        {
            let stdin = child.stdin.as_mut().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin not piped")
            })?;
            serde_json::to_writer(&mut *stdin, request)?;
            stdin.flush()?;
        }

        let output = child.wait_with_output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompileError::Syntax(stderr.trim().to_string()));
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}

impl TemplateCompiler for DenoCompiler {
    fn parse(&self, source: &str) -> Result<Ast, CompileError> {
        let text = self.run(&json!({ "mode": "parse", "input": source }))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn precompile(
        &self,
        input: Source<'_>,
        options: &CompilerOptions,
    ) -> Result<String, CompileError> {
        let input = match input {
            Source::Text(text) => Value::from(text),
            Source::Ast(ast) => ast.0.clone(),
        };

        self.run(&json!({
            "mode": "precompile",
            "input": input,
            "options": options.to_json(),
        }))
    }
}
