//! CLI: program file + call site → (schema | materialize | compile | cache-key)
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use json_shape::cache::{CompilationCache, Compiled};
use json_shape::config::EngineConfig;
use json_shape::emit::{self, EmitOptions};
use json_shape::materialize::Materializer;
use json_shape::program::Program;
use json_shape::repair;
use json_shape::scope::{DeclarationTable, Scope};
use json_shape::{CallSite, CallSiteIdentity, Locus, Schema, SchemaResolver};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// resolve the expected shape of a generator call site, describe it as JSON Schema
/// and turn raw responses back into typed values
#[derive(Parser, Debug)]
#[command(name = "json-shape", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// resolve a call site and print its JSON schema
    Schema(SchemaOut),
    /// materialize raw responses against a call site's schema
    Materialize(MaterializeIn),
    /// print the compiled artifact for a call site, using the cache
    Compile(CompileOut),
    /// print the cache file name of a call site
    CacheKey(CacheKeyOut),
}

#[derive(Args, Debug, Clone)]
struct SiteSettings {
    /// declaration program (JSON)
    #[arg(long, short)]
    program: PathBuf,

    /// call site identity as `path:line:operation`
    #[arg(long)]
    site: CallSiteIdentity,

    /// innermost lexical scope of the call, e.g. `shop.Cart.total`
    #[arg(long, default_value = "")]
    scope: String,

    /// condition | while | return | assign:NAME | destructure:N | explicit:TYPE
    #[arg(long, default_value = "return")]
    locus: Locus,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug)]
struct SchemaOut {
    #[command(flatten)]
    site_settings: SiteSettings,

    /// describe union branches as tagged envelopes
    #[arg(long)]
    tagged: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MaterializeIn {
    #[command(flatten)]
    site_settings: SiteSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// exact wire kinds only, tagged unions required (default: $JSON_SHAPE_STRICT)
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct CompileOut {
    #[command(flatten)]
    site_settings: SiteSettings,

    /// describe union branches as tagged envelopes
    #[arg(long)]
    tagged: bool,

    /// cache root (default: $JSON_SHAPE_CACHE_DIR, then ~/.json-shape/caches)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CacheKeyOut {
    /// call site identity as `path:line:operation`
    #[arg(long)]
    site: CallSiteIdentity,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl SiteSettings {
    fn call_site(&self) -> CallSite {
        CallSite::new(self.site.clone(), Scope::parse(&self.scope), self.locus.clone())
    }

    fn load_table(&self) -> Result<DeclarationTable> {
        let program = Program::load(&self.program)?;
        Ok(program.to_table(Some(&self.program)))
    }

    fn resolve(&self) -> Result<Schema> {
        let resolver = SchemaResolver::new(self.load_table()?);
        let site = self.call_site();
        resolver
            .resolve(&site)
            .with_context(|| format!("failed to resolve call site {}", site.identity))
    }
}

impl InputSettings {
    fn load_process(&self, mut apply: impl FnMut(&Path, String) -> Result<()>) -> Result<()> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        for source_path in source_paths {
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {}", source_path.display()))?;
            apply(&source_path, source)?;
        }
        Ok(())
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<ExitCode> {
        match &self.cmd {
            Command::Schema(target) => {
                let schema = target.site_settings.resolve()?;
                let options = EmitOptions { tagged_unions: target.tagged };
                let schema_src = format!("{:#}", emit::wire_schema_with(&schema, options));
                write_output(target.out.as_deref(), &schema_src)?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Materialize(target) => {
                let schema = target.site_settings.resolve()?;
                let strict = target.strict.then_some(true);
                let config = EngineConfig::resolve(strict, None);
                let materializer = Materializer::new(config.mode);

                // 1) every input is attempted; failures are reported, not fatal
                let mut failed = 0usize;
                target.input_settings.load_process(|path, raw| {
                    let outcome = repair::parse_wire(&raw)
                        .map_err(anyhow::Error::from)
                        .and_then(|wire| Ok(materializer.materialize(&schema, &wire)?));
                    match outcome {
                        Ok(value) => {
                            println!("{}: {value}", path.display());
                            println!("{:#}", value.to_wire());
                        }
                        Err(error) => {
                            failed += 1;
                            eprintln!("{} {}: {error}", "✗".red().bold(), path.display());
                        }
                    }
                    Ok(())
                })?;

                // 2) summarize
                if failed > 0 {
                    eprintln!("{}", format!("{failed} input(s) failed to materialize").red());
                    return Ok(ExitCode::FAILURE);
                }
                Ok(ExitCode::SUCCESS)
            }
            Command::Compile(target) => {
                let settings = &target.site_settings;
                let config = EngineConfig::resolve(None, target.cache_dir.as_deref());
                let cache = CompilationCache::open(&config.cache)?;
                let options = EmitOptions { tagged_unions: target.tagged };

                let artifact = cache.get_or_compile(&settings.site, || -> Result<Compiled> {
                    let schema = settings.resolve()?;
                    let mut dependencies = schema.referenced_artifacts();
                    dependencies.insert(settings.program.clone());
                    Ok(Compiled {
                        artifact: emit::compiled_artifact(&schema, options),
                        dependencies: dependencies.into_iter().collect(),
                    })
                })?;
                print!("{artifact}");
                Ok(ExitCode::SUCCESS)
            }
            Command::CacheKey(target) => {
                println!("{}", target.site.to_cache_filename());
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, text).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let before = out.len();
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
                out.push(entry?);
            }
            if out.len() == before {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
