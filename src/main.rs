//! Rachet Compiler CLI

use clap::{ArgAction, Parser as ClapParser};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

use rachet::config::{self, Manifest, ToolchainConfig};
use rachet::diagnostics::Diagnostics;
use rachet::linker::{self, LinkOptions};
use rachet::{codegen, parse_source, runtime, RachetError, RachetResult, LANGUAGE_NAME, VERSION};

#[derive(ClapParser, Debug)]
#[command(name = "rachet")]
#[command(author = "Bean Pringles")]
#[command(version = VERSION)]
#[command(about = "Compile Rachet programs into bootable x86 images", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Source file to compile
    input: Option<PathBuf>,

    #[command(flatten)]
    build: BuildFlags,

    /// Watch the source file and rebuild on change
    #[arg(short, long)]
    watch: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Explicit log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<Level>,

    /// Disable coloured diagnostics
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct BuildFlags {
    /// Output directory for intermediates and the final image
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the assembled unit instead of linking
    #[arg(long)]
    emit_asm: bool,

    /// Print the AST as JSON instead of compiling
    #[arg(long)]
    emit_ast: bool,

    /// Print the toolchain steps without running them
    #[arg(long)]
    dry_run: bool,

    /// Keep the .asm/.o files and the staged iso tree
    #[arg(long)]
    keep_intermediates: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Initialize a new Rachet project
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Explicit project name
        #[arg(long)]
        name: Option<String>,
    },

    /// Build the project described by Rachet.toml
    Build {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        flags: BuildFlags,
    },

    /// Lex, parse and generate code without invoking the toolchain
    Check { input: PathBuf },

    /// Remove intermediates, staged iso trees and built images
    Clean {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

/// Everything needed to turn one source file into one image
#[derive(Debug, Clone)]
struct Job {
    input: PathBuf,
    name: String,
    out_dir: PathBuf,
    toolchain: ToolchainConfig,
    keep_intermediates: bool,
}

impl Job {
    /// Single-file build; a manifest above the file still supplies the toolchain.
    fn for_file(input: &Path, flags: &BuildFlags) -> RachetResult<Self> {
        let dir = input.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        let (manifest, root) = match config::find_project_root(&dir) {
            Some(root) => (config::load_manifest(&root)?, root),
            None => {
                let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("main");
                (Manifest::new(stem), PathBuf::from("."))
            }
        };
        let mut job = Self::from_manifest(&manifest, &root, flags);
        job.input = input.to_path_buf();
        Ok(job)
    }

    fn for_project(root: &Path, flags: &BuildFlags) -> RachetResult<Self> {
        let manifest = config::load_manifest(root)?;
        Ok(Self::from_manifest(&manifest, root, flags))
    }

    fn from_manifest(manifest: &Manifest, root: &Path, flags: &BuildFlags) -> Self {
        let mut toolchain = manifest.toolchain.clone();
        toolchain.kernel = toolchain.kernel.map(|k| root.join(k));
        Self {
            input: root.join(&manifest.build.entry),
            name: manifest.package.name.clone(),
            out_dir: flags.output.clone().unwrap_or_else(|| root.join(&manifest.build.output)),
            toolchain,
            keep_intermediates: flags.keep_intermediates || manifest.build.keep_intermediates,
        }
    }
}

fn report(error: &RachetError, source: &str, filename: &str, color: bool) {
    let diag = Diagnostics::new(source, filename).with_color(color);
    eprint!("{}", diag.render_error(error));
}

/// Compile one job; diagnostics are printed here, the bool says whether it worked.
fn run_compile(job: &Job, flags: &BuildFlags, link: bool, color: bool) -> bool {
    let source = match fs::read_to_string(&job.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to read {}: {}", job.input.display(), e);
            return false;
        }
    };
    let filename = job.input.to_string_lossy().into_owned();
    info!(input = %job.input.display(), bytes = source.len(), "compiling");

    let program = match parse_source(&source) {
        Ok(program) => program,
        Err(e) => {
            report(&e, &source, &filename, color);
            return false;
        }
    };

    if flags.emit_ast {
        return match serde_json::to_string_pretty(&program) {
            Ok(json) => {
                println!("{}", json);
                true
            }
            Err(e) => {
                eprintln!("error: failed to serialize AST: {}", e);
                false
            }
        };
    }

    let generated = match codegen::generate(&program) {
        Ok(generated) => generated,
        Err(e) => {
            report(&e, &source, &filename, color);
            return false;
        }
    };

    let diag = Diagnostics::new(&source, &filename).with_color(color);
    for warning in &generated.warnings {
        eprint!("{}", diag.render_warning(warning));
    }

    if !link {
        println!("{}: ok ({} target, {} warnings)", filename, generated.target, generated.warnings.len());
        return true;
    }

    let kernel = match runtime::load_preamble(job.toolchain.kernel.as_deref()) {
        Ok(kernel) => kernel,
        Err(e) => {
            eprint!("{}", diag.render_error(&e));
            return false;
        }
    };

    if flags.emit_asm {
        print!("{}", linker::render_unit(&kernel, &generated.data_asm(), &generated.text_asm()));
        return true;
    }

    let opts = LinkOptions {
        out_dir: job.out_dir.clone(),
        name: job.name.clone(),
        target: generated.target,
        toolchain: job.toolchain.clone(),
        keep_intermediates: job.keep_intermediates,
    };
    let unit = linker::render_unit(&kernel, &generated.data_asm(), &generated.text_asm());
    let plan = linker::plan(&opts, unit);

    if flags.dry_run {
        for step in &plan.steps {
            println!("{}", step);
        }
        for path in &plan.intermediates {
            println!("rm -rf {}", path.display());
        }
        return true;
    }

    match plan.execute() {
        Ok(artifact) => {
            println!("Successfully created {}", artifact.display());
            true
        }
        Err(e) => {
            eprint!("{}", diag.render_error(&e));
            false
        }
    }
}

/// Only writes to the source itself count; siblings such as our own build
/// outputs also show up through the directory watch.
fn touches_input(event: &notify::Event, input: &Path) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event.paths.iter().any(|path| path.file_name() == input.file_name())
}

fn watch_mode(job: &Job, flags: &BuildFlags, color: bool) -> RachetResult<()> {
    use notify::{Event, RecursiveMode, Watcher};
    use std::sync::mpsc::{channel, RecvTimeoutError};

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| RachetError::config(format!("cannot install Ctrl-C handler: {}", e)))?;

    println!("Watching {} for changes... (Ctrl+C to stop)", job.input.display());
    run_compile(job, flags, true, color);

    let (tx, rx) = channel();
    let input = job.input.clone();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            if touches_input(&event, &input) {
                let _ = tx.send(());
            }
        }
    })
    .map_err(|e| RachetError::config(format!("cannot create file watcher: {}", e)))?;

    watcher
        .watch(&job.input, RecursiveMode::NonRecursive)
        .map_err(|e| RachetError::config(format!("cannot watch {}: {}", job.input.display(), e)))?;
    // Editors that replace the file on save only show up on the directory
    if let Some(parent) = job.input.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = watcher.watch(parent, RecursiveMode::NonRecursive) {
            warn!(dir = %parent.display(), error = %e, "cannot watch parent directory");
        }
    }

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(()) => {
                // Let the write settle, then drop the burst of events it produced
                std::thread::sleep(Duration::from_millis(50));
                while rx.try_recv().is_ok() {}
                println!("File changed, recompiling...");
                run_compile(job, flags, true, color);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    println!("Stopping watch mode");
    Ok(())
}

fn init_logging(verbose: u8, explicit: Option<Level>) {
    let level = explicit.unwrap_or(match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    });
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn clean_project(path: &Path) -> RachetResult<()> {
    let (out_dir, name) = match config::find_project_root(path) {
        Some(root) => {
            let manifest = config::load_manifest(&root)?;
            (root.join(&manifest.build.output), manifest.package.name)
        }
        None => (path.join("build"), "main".to_string()),
    };
    let removed = linker::clean(&out_dir, &name)?;
    for path in &removed {
        println!("removed {}", path.display());
    }
    if removed.is_empty() {
        println!("nothing to clean in {}", out_dir.display());
    }
    Ok(())
}

fn run(args: Args) -> RachetResult<bool> {
    let color = !args.no_color;
    match args.command {
        Some(Commands::Init { path, name }) => {
            let name = config::init_project(&path, name)?;
            println!("Initialized new {} project: {}", LANGUAGE_NAME, name);
            Ok(true)
        }
        Some(Commands::Build { path, flags }) => {
            let job = Job::for_project(&path, &flags)?;
            Ok(run_compile(&job, &flags, true, color))
        }
        Some(Commands::Check { input }) => {
            let job = Job::for_file(&input, &BuildFlags::default())?;
            Ok(run_compile(&job, &BuildFlags::default(), false, color))
        }
        Some(Commands::Clean { path }) => {
            clean_project(&path)?;
            Ok(true)
        }
        None => {
            let Some(input) = args.input else {
                eprintln!("No input file provided. Use --help for usage.");
                return Ok(false);
            };
            let job = Job::for_file(&input, &args.build)?;
            if args.watch {
                watch_mode(&job, &args.build, color)?;
                Ok(true)
            } else {
                Ok(run_compile(&job, &args.build, true, color))
            }
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.log_level);

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
