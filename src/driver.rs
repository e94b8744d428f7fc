// Copyright (c) Sony Pictures Imageworks, et al.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/imageworks/spk

//! Top-level argument parsing and the run procedure: resolve the input
//! manifest, prepare the output base, parse and archive the manifest,
//! reconcile the tree against it, and atomically publish the archive.
//! [`run`] is the only place in this crate that calls
//! [`std::process::exit`]; everything it calls returns a plain `Result`.

use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::manifest::parser::{ManifestParser, ParseOptions};
use crate::path_ops::{HardlinkEquivalence, LinkAlgorithm, PathOps};
use crate::reconcile::{Reconciler, SilentReporter, TracingReporter};

/// Reconciles an on-disk directory tree to match a runfiles manifest.
#[derive(Parser, Debug)]
#[command(name = "build-runfiles", version, about)]
struct Cli {
    /// Allow manifest targets that are not absolute paths.
    #[arg(long)]
    allow_relative: bool,

    /// Treat every even-numbered manifest line as opaque metadata.
    #[arg(long)]
    use_metadata: bool,

    /// Realize symlinks as Windows junctions/hardlinks instead of POSIX
    /// symlinks.
    #[arg(long)]
    windows_compatible: bool,

    /// How strictly a hardlinked file must match its desired target name
    /// to be considered already correct on a Windows-family host.
    #[arg(long, value_enum, default_value = "strong")]
    hardlink_equivalence: HardlinkEquivalenceArg,

    /// Increase diagnostic verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// The input manifest path.
    input: PathBuf,

    /// The output base directory to reconcile in place.
    runfiles: PathBuf,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum HardlinkEquivalenceArg {
    Strong,
    Weak,
}

impl From<HardlinkEquivalenceArg> for HardlinkEquivalence {
    fn from(value: HardlinkEquivalenceArg) -> Self {
        match value {
            HardlinkEquivalenceArg::Strong => HardlinkEquivalence::Strong,
            HardlinkEquivalenceArg::Weak => HardlinkEquivalence::Weak,
        }
    }
}

/// Parse argv, run the reconciliation, and exit the process with the
/// appropriate code. Diagnostics are written to stderr with the
/// `<argv0> (args <INPUT> <RUNFILES>): ` prefix on failure.
///
/// Usage errors (missing/unknown arguments) are reported as argument
/// errors and exit 1, matching every other failure kind; `--help` and
/// `--version` still print and exit 0, since clap handles those before
/// any argument validation runs.
pub fn run() -> ! {
    let argv0 = std::env::args().next().unwrap_or_else(|| "build-runfiles".to_string());
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{err}");
            std::process::exit(0)
        }
        Err(err) => {
            eprint!("{err}");
            std::process::exit(1)
        }
    };
    init_logging(cli.verbose);

    let diagnostics = Diagnostics::new(argv0, cli.input.clone(), cli.runfiles.clone());

    match execute(&cli, &diagnostics) {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("{}", diagnostics.render(&err));
            std::process::exit(1)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let _ = tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).try_init();
}

fn execute(cli: &Cli, diagnostics: &Diagnostics) -> Result<()> {
    let input = resolve_input(&cli.input)?;

    #[cfg(unix)]
    let ops = crate::path_ops::UnixOps;
    #[cfg(windows)]
    let ops = crate::path_ops::WindowsOps;

    ensure_output_base(&ops, diagnostics.runfiles())?;

    std::env::set_current_dir(diagnostics.runfiles())
        .map_err(|source| Error::filesystem(diagnostics.runfiles(), source))?;

    let manifest_tmp = std::path::Path::new(crate::desired_state::MANIFEST_TMP_NAME);
    let mut archive = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(manifest_tmp)
        .map_err(|source| Error::filesystem(manifest_tmp, source))?;

    let reader = OpenOptions::new()
        .read(true)
        .open(&input)
        .map_err(|source| Error::MissingInput { path: input.clone(), source })?;

    let mut desired = ManifestParser::parse(
        BufReader::new(reader),
        &mut archive,
        &ParseOptions { allow_relative: cli.allow_relative, use_metadata: cli.use_metadata },
    )?;
    drop(archive);

    desired.reserve_manifest_tmp();

    match ops.unlink(std::path::Path::new(crate::desired_state::MANIFEST_NAME)) {
        Ok(()) => {}
        Err(err) if is_not_found(&err) => {}
        Err(err) => return Err(err),
    }

    let link_algorithm =
        if cli.windows_compatible { LinkAlgorithm::WindowsCompatible } else { LinkAlgorithm::Posix };

    let reporter: Box<dyn crate::reconcile::ReconcileReporter> =
        if cli.verbose > 0 { Box::new(TracingReporter) } else { Box::new(SilentReporter) };

    let reconciler = Reconciler::new(
        &ops,
        reporter.as_ref(),
        ".",
        link_algorithm,
        cli.hardlink_equivalence.into(),
    );
    reconciler.scan_and_prune(&mut desired)?;
    reconciler.create_files(&desired)?;

    ops.rename(manifest_tmp, std::path::Path::new(crate::desired_state::MANIFEST_NAME))?;

    Ok(())
}

fn resolve_input(input: &std::path::Path) -> Result<PathBuf> {
    if input.is_absolute() {
        Ok(input.to_path_buf())
    } else {
        let cwd = std::env::current_dir().map_err(|source| Error::filesystem(input, source))?;
        Ok(cwd.join(input))
    }
}

fn ensure_output_base(ops: &dyn PathOps, runfiles: &std::path::Path) -> Result<()> {
    match ops.lstat(runfiles)? {
        Some(_) => ops.ensure_mode(runfiles, 0o700),
        None => ops.ensure_dir(runfiles, 0o777),
    }
}

fn is_not_found(err: &Error) -> bool {
    matches!(err, Error::Filesystem { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
}
