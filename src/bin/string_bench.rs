use clap::{Parser, Subcommand, ValueEnum};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Command as Process, ExitCode};
use std::time::Duration;
use string_build_bench::alloc::Jemalloc;
use string_build_bench::benches::strings::{self, BenchOutcome};
use string_build_bench::error::HarnessResult;
use string_build_bench::harness::{BenchConfig, Profile};
use string_build_bench::metrics::{Metric, ProcessSource};
use string_build_bench::schema::{BenchmarkEntry, RunMeta, SuiteReport, SCHEMA_VERSION};
use string_build_bench::Variant;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl ProfileArg {
    fn as_str(&self) -> &'static str {
        match self {
            ProfileArg::Quick => "quick",
            ProfileArg::Full => "full",
        }
    }
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

impl Format {
    fn as_str(&self) -> &'static str {
        match self {
            Format::Table => "table",
            Format::Json => "json",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the selected benchmarks in this process.
    Run {
        /// Variant to run. Can be provided multiple times; defaults to all.
        #[arg(long = "variant", value_enum)]
        variants: Vec<Variant>,
    },

    /// Run each selected benchmark in its own child process.
    ///
    /// Keeps allocation counters from one benchmark out of the next.
    Suite {
        #[arg(long = "variant", value_enum)]
        variants: Vec<Variant>,
    },

    /// List the available variants.
    List,
}

#[derive(Parser, Debug)]
#[command(name = "string-bench")]
#[command(about = "String-building microbenchmarks (time, CPU, allocation counts)")]
struct Args {
    #[arg(long, value_enum, default_value_t = ProfileArg::Quick, global = true)]
    profile: ProfileArg,

    /// Input length N (the workload renders 0..N).
    #[arg(long, global = true)]
    size: Option<usize>,

    /// Warmup iterations (discarded).
    #[arg(long, global = true)]
    warmup: Option<u64>,

    /// Maximum measured iterations.
    #[arg(long, global = true)]
    max_iterations: Option<u64>,

    /// Wall-time budget per benchmark, warmup included.
    #[arg(long, value_name = "MS", global = true)]
    max_duration_ms: Option<u64>,

    /// Multiplier applied to warmup and iteration counts.
    #[arg(long, default_value_t = 1.0, global = true)]
    scale: f64,

    /// Metric to collect. Can be provided multiple times; defaults to all.
    #[arg(long = "metric", value_enum, global = true)]
    metrics: Vec<Metric>,

    #[arg(long, value_enum, default_value_t = Format::Table, global = true)]
    format: Format,

    /// Where to write the report. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

impl Args {
    fn bench_config(&self) -> BenchConfig {
        BenchConfig {
            profile: self.profile.into(),
            size: self.size,
            warmup: self.warmup,
            max_iterations: self.max_iterations,
            max_duration: self.max_duration_ms.map(Duration::from_millis),
            scale: self.scale,
            metrics: self.metrics.clone(),
        }
    }

    /// Arguments for a child `run` of a single variant.
    fn child_args(&self, variant: Variant) -> Vec<OsString> {
        let mut out: Vec<OsString> = vec![
            "--profile".into(),
            self.profile.as_str().into(),
            "--scale".into(),
            self.scale.to_string().into(),
            "--format".into(),
            self.format.as_str().into(),
        ];
        if let Some(size) = self.size {
            push_flag(&mut out, "--size", size.to_string());
        }
        if let Some(warmup) = self.warmup {
            push_flag(&mut out, "--warmup", warmup.to_string());
        }
        if let Some(max) = self.max_iterations {
            push_flag(&mut out, "--max-iterations", max.to_string());
        }
        if let Some(ms) = self.max_duration_ms {
            push_flag(&mut out, "--max-duration-ms", ms.to_string());
        }
        for metric in &self.metrics {
            push_flag(&mut out, "--metric", metric.as_str().to_string());
        }
        out.push("run".into());
        push_flag(&mut out, "--variant", variant.as_str().to_string());
        out
    }
}

fn push_flag(out: &mut Vec<OsString>, name: &str, value: String) {
    out.push(name.into());
    out.push(value.into());
}

fn selected(variants: &[Variant]) -> Vec<Variant> {
    if variants.is_empty() {
        Variant::ALL.to_vec()
    } else {
        variants.to_vec()
    }
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn run_meta(cfg: &BenchConfig) -> RunMeta {
    RunMeta {
        schema_version: SCHEMA_VERSION,
        bench_version: env!("CARGO_PKG_VERSION").to_string(),
        profile: cfg.profile.as_str().to_string(),
        input_size: cfg.input_size(),
        timestamp_utc: now_utc(),
        git_sha: git_sha_short(),
    }
}

fn render_table(outcomes: &[BenchOutcome]) -> String {
    let mut text = String::new();
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => text.push_str(&report.render()),
            Err(e) => text.push_str(&format!("{}: FAILED: {e}\n", outcome.variant.as_str())),
        }
        text.push('\n');
    }
    text
}

fn emit(out: Option<&PathBuf>, text: &str) -> io::Result<()> {
    match out {
        Some(path) => fs::write(path, text),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn cmd_run(args: &Args, variants: &[Variant]) -> HarnessResult<bool> {
    let cfg = args.bench_config();
    let source = ProcessSource::new();
    if !string_build_bench::alloc::is_installed() {
        warn!("jemalloc stats not available; allocation metrics unavailable");
    }

    let outcomes = strings::run(&cfg, &selected(variants), &source)?;
    let ok = !strings::any_failed(&outcomes);

    let text = match args.format {
        Format::Table => render_table(&outcomes),
        Format::Json => {
            let report = SuiteReport {
                run: run_meta(&cfg),
                benchmarks: outcomes.iter().map(BenchmarkEntry::from).collect(),
            };
            serde_json::to_string_pretty(&report).map_err(io::Error::other)? + "\n"
        }
    };
    emit(args.out.as_ref(), &text)?;
    Ok(ok)
}

fn cmd_suite(args: &Args, variants: &[Variant]) -> HarnessResult<bool> {
    let cfg = args.bench_config();
    let exe = std::env::current_exe()?;

    let mut ok = true;
    let mut text = String::new();
    let mut entries = Vec::new();

    for variant in selected(variants) {
        let output = Process::new(&exe).args(args.child_args(variant)).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            ok = false;
            error!(benchmark = variant.as_str(), status = %output.status, "child run failed");
        }

        match args.format {
            Format::Table if stdout.is_empty() => {
                text.push_str(&format!(
                    "{}: FAILED: child exited with {}\n\n",
                    variant.as_str(),
                    output.status
                ));
            }
            Format::Table => text.push_str(&stdout),
            Format::Json => match serde_json::from_str::<SuiteReport>(&stdout) {
                Ok(child) => entries.extend(child.benchmarks),
                Err(e) => {
                    ok = false;
                    entries.push(BenchmarkEntry::failed(
                        variant.as_str(),
                        format!("child exited with {}: {e}", output.status),
                    ));
                }
            },
        }
    }

    if args.format == Format::Json {
        let report = SuiteReport {
            run: run_meta(&cfg),
            benchmarks: entries,
        };
        text = serde_json::to_string_pretty(&report).map_err(io::Error::other)? + "\n";
    }
    emit(args.out.as_ref(), &text)?;
    Ok(ok)
}

fn cmd_list() {
    for variant in Variant::ALL {
        println!("{:<20} {}", variant.as_str(), variant.description());
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let result = match &args.cmd {
        Command::Run { variants } => cmd_run(&args, variants),
        Command::Suite { variants } => cmd_suite(&args, variants),
        Command::List => {
            cmd_list();
            Ok(true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "string-bench failed");
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
