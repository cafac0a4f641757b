use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use hbs_precompile::{
    AmdOption, DenoCompiler, NamespaceOption, Precompiler, ProjectConfig, TaskConfig,
};

/// Precompile a directory of Handlebars templates into one JavaScript file.
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
struct Args {
    /// TOML file with one or more `[[task]]` tables.
    #[clap(short, long)]
    config: Option<Utf8PathBuf>,

    /// Directory containing the templates.
    #[clap(short, long)]
    input: Option<Utf8PathBuf>,

    /// Path of the generated file.
    #[clap(short, long)]
    output: Option<Utf8PathBuf>,

    /// Namespace the templates are assigned to, e.g. `App.Templates`.
    #[clap(short, long, conflicts_with = "no_namespace")]
    namespace: Option<String>,

    /// Emit templates without a namespace.
    #[clap(long)]
    no_namespace: bool,

    /// Wrap the output in an AMD `define` call.
    #[clap(long, conflicts_with = "commonjs")]
    amd: bool,

    /// Wrap the output in a CommonJS `module.exports` function.
    #[clap(long)]
    commonjs: bool,

    /// Deno executable used to run the Handlebars compiler.
    #[clap(long, default_value = "deno")]
    deno: String,
}

impl Args {
    fn apply(&self, config: &mut TaskConfig) {
        if let Some(input) = &self.input {
            config.input_dir = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = output.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            if let Some(file) = output.file_name() {
                config.output_file = file.into();
            }
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = NamespaceOption::Path(namespace.clone());
        }
        if self.no_namespace {
            config.namespace = NamespaceOption::Flag(false);
        }
        if self.amd {
            config.amd = AmdOption::Flag(true);
            config.commonjs = false;
        }
        if self.commonjs {
            config.amd = AmdOption::Flag(false);
            config.commonjs = true;
        }
    }
}

/// Task configurations from the config file, or a single default task, with
/// the command line overrides applied.
fn load_configs(args: &Args) -> anyhow::Result<Vec<TaskConfig>> {
    let mut configs = match &args.config {
        Some(path) => ProjectConfig::from_file(path)
            .with_context(|| format!("Loading {path}"))?
            .tasks,
        None => vec![TaskConfig::default()],
    };

    if configs.len() > 1 && (args.input.is_some() || args.output.is_some()) {
        anyhow::bail!(
            "--input and --output can't be used with a config file defining {} tasks",
            configs.len()
        );
    }

    for config in &mut configs {
        args.apply(config);
    }

    Ok(configs)
}

fn main() -> anyhow::Result<()> {
    hbs_precompile::init_logging();

    let args = Args::parse();
    let configs = load_configs(&args)?;

    let summary = Precompiler::from_configs(configs)?
        .with_compiler(DenoCompiler::new().binary(&args.deno))
        .run()?;

    if summary.skipped() > 0 {
        tracing::warn!("{} templates failed to compile", summary.skipped());
    }

    Ok(())
}
