//! Sigil CLI
//!
//! Usage:
//!   sigil [OPTIONS] <COMMAND>
//!
//! Commands:
//!   compile <NAME>   Compile a template and store the artifact
//!   inline           Compile source from stdin or --file and print the code
//!   render <NAME>    Render a template with its layouts
//!   flush            Invalidate every cached artifact
//!   path <NAME>      Print the artifact path for a template

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use log::debug;

use sigil::{CompileError, Engine, EngineConfig, RenderError, Variables};

#[derive(Parser)]
#[command(name = "sigil")]
#[command(about = "Compile and render @-directive templates")]
struct Cli {
    /// Template root directory
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file (TOML format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Debug mode: runtime includes and source change detection
    #[arg(short, long, global = true)]
    debug: bool,

    /// Template alias as name=directory (repeatable)
    #[arg(short, long = "alias", global = true, value_parser = parse_pair)]
    aliases: Vec<(String, String)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a template and store the artifact
    Compile { name: String },

    /// Compile source from stdin (or a file) and print the generated code
    Inline {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Render a template
    Render {
        name: String,

        /// Variable as key=value (repeatable)
        #[arg(long = "var", value_parser = parse_pair)]
        vars: Vec<(String, String)>,

        /// JSON file with an object of variables
        #[arg(long = "vars")]
        vars_file: Option<PathBuf>,
    },

    /// Invalidate every cached artifact
    Flush,

    /// Print the cache artifact path of a template
    Path { name: String },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

fn main() {
    Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };
    debug!("template root {}", config.root.display());

    let engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => fail(&e),
    };

    let result = match &cli.command {
        Command::Compile { name } => engine.compile(name).map(|code| {
            println!("{}", engine.artifact_path(name).display());
            debug!("{} bytes of generated code", code.len());
        }),
        Command::Inline { file } => {
            let source = read_input(file.as_ref());
            match engine.compile_inline(&source) {
                Ok(code) => {
                    print!("{}", code);
                    Ok(())
                }
                Err(e) => report_compile_error(&e, &source, file.as_ref()),
            }
        }
        Command::Render {
            name,
            vars,
            vars_file,
        } => render(&engine, name, vars, vars_file.as_ref()),
        Command::Flush => engine.flush().map_err(RenderError::from),
        Command::Path { name } => {
            println!("{}", engine.artifact_path(name).display());
            Ok(())
        }
    };

    if let Err(e) = result {
        if let RenderError::Compile(err) = &e {
            if let Some(path) = &err.file {
                if let Ok(source) = fs::read_to_string(path) {
                    eprint!("{}", err.format(&source, &path.display().to_string()));
                    std::process::exit(1);
                }
            }
        }
        fail(&e);
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig, RenderError> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache.directory = dir.clone();
    }
    if cli.debug {
        config.debug = true;
    }
    for (alias, directory) in &cli.aliases {
        config.aliases.insert(alias.clone(), PathBuf::from(directory));
    }
    Ok(config)
}

fn render(
    engine: &Engine,
    name: &str,
    vars: &[(String, String)],
    vars_file: Option<&PathBuf>,
) -> Result<(), RenderError> {
    let mut variables = Variables::new();

    if let Some(path) = vars_file {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => fail(&format!("Error reading file '{}': {}", path.display(), e)),
        };
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Object(map)) => variables = map,
            Ok(_) => fail(&format!("'{}' must contain a JSON object", path.display())),
            Err(e) => fail(&format!("Error parsing '{}': {}", path.display(), e)),
        }
    }

    for (key, value) in vars {
        variables.insert(key.clone(), serde_json::Value::String(value.clone()));
    }

    let output = engine.render(name, variables)?;
    print!("{}", output);
    Ok(())
}

fn read_input(file: Option<&PathBuf>) -> String {
    match file {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => fail(&format!("Error reading file '{}': {}", path.display(), e)),
        },
        None => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => buffer,
                Err(e) => fail(&format!("Error reading from stdin: {}", e)),
            }
        }
    }
}

fn report_compile_error(
    err: &CompileError,
    source: &str,
    file: Option<&PathBuf>,
) -> ! {
    let filename = file.map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());
    eprint!("{}", err.format(source, &filename));
    std::process::exit(1);
}

fn fail(e: &dyn std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}
