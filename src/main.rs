use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tree_rooting::io::{read_newick_trees, write_lines};
use tree_rooting::mad::MadOptions;
use tree_rooting::root::{Diagnostics, RootMethod, Rooted, root_batch};
use tree_rooting::tree::Tree;

/// Reroot phylogenetic trees read from a Newick file and write the rooted
/// trees one per line.
#[derive(Parser, Debug)]
#[command(name = "tree-root", version, about = "Reroot Newick trees by midpoint, outgroup, MAD or MV")]
struct Args {
    /// Newick tree file, plain or .gz (`-` for stdin)
    #[arg(short = 'i', long = "input", default_value = "-")]
    input: PathBuf,

    /// Output path; a .gz suffix compresses (`-` for stdout)
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,

    /// Rooting method
    #[arg(short = 'm', long = "method", value_enum, default_value_t = MethodArg::Mad)]
    method: MethodArg,

    /// Comma-separated outgroup leaf labels (method outgroup)
    #[arg(long = "outgroup", value_delimiter = ',')]
    outgroup: Vec<String>,

    /// Rooted tree whose root split is copied (method transfer)
    #[arg(long = "reference")]
    reference: Option<PathBuf>,

    /// Keep branches down to 1e-15 instead of contracting below 1e-6 (method mad)
    #[arg(long = "retain-tiny", default_value_t = false)]
    retain_tiny: bool,

    /// Append the rooting statistics as a Newick comment (method mad)
    #[arg(long = "stats", default_value_t = false)]
    stats: bool,

    /// Among tied roots keep only the one with the smallest clock CV (method mad)
    #[arg(long = "single", default_value_t = false)]
    single: bool,

    /// Quiet mode: only errors are logged
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,

    /// Verbose mode: debug logging
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MethodArg {
    Midpoint,
    Outgroup,
    Transfer,
    Mad,
    Mv,
}

fn main() {
    let args = Args::parse();

    let level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let t0 = Instant::now();
    let trees = match read_newick_trees(&args.input) {
        Ok(trees) if !trees.is_empty() => trees,
        Ok(_) => {
            error!("No trees parsed from {:?}.", args.input);
            std::process::exit(2);
        }
        Err(e) => {
            error!("Failed to read {:?}: {e}", args.input);
            std::process::exit(2);
        }
    };
    info!("Read {} trees in {:.3}s", trees.len(), t0.elapsed().as_secs_f64());

    let reference = match (args.method, &args.reference) {
        (MethodArg::Transfer, Some(path)) => Some(read_reference(path)),
        (MethodArg::Transfer, None) => {
            error!("Method transfer needs --reference.");
            std::process::exit(2);
        }
        _ => None,
    };

    let method = match args.method {
        MethodArg::Midpoint => RootMethod::Midpoint,
        MethodArg::Outgroup => RootMethod::Outgroup(args.outgroup.clone()),
        // `reference` is always set for transfer, checked above
        MethodArg::Transfer => match reference.as_ref() {
            Some(tree) => RootMethod::Transfer(tree),
            None => std::process::exit(2),
        },
        MethodArg::Mad => RootMethod::Mad {
            options: if args.retain_tiny {
                MadOptions::retain_tiny()
            } else {
                MadOptions::default()
            },
            single: args.single,
        },
        MethodArg::Mv => RootMethod::MinVar,
    };

    let t1 = Instant::now();
    let total = trees.len();
    let results = root_batch(trees, &method);
    let mut lines = Vec::new();
    let mut failed = 0usize;
    for (idx, result) in results.iter().enumerate() {
        match result {
            Ok(rooted) => match output_lines(rooted, args.stats) {
                Ok(mut out) => lines.append(&mut out),
                Err(e) => {
                    error!("tree {}: {e}", idx + 1);
                    failed += 1;
                }
            },
            Err(_) => failed += 1,
        }
    }
    info!(
        "Rooted {} of {total} trees using {} in {:.3}s",
        total - failed,
        method.name(),
        t1.elapsed().as_secs_f64()
    );

    let t2 = Instant::now();
    if let Err(e) = write_lines(&args.output, &lines) {
        error!("Failed to write output {:?}: {e}", args.output);
        std::process::exit(4);
    }
    let target = if args.output.as_os_str() == "-" { "stdout" } else { "output" };
    info!("Writing to {target} {:.3}s", t2.elapsed().as_secs_f64());

    if failed == total {
        std::process::exit(1);
    }
}

fn read_reference(path: &Path) -> Tree {
    match read_newick_trees(path) {
        Ok(trees) => match trees.into_iter().next() {
            Some(Ok(tree)) => tree,
            Some(Err(e)) => {
                error!("Failed to parse reference tree {path:?}: {e}");
                std::process::exit(2);
            }
            None => {
                error!("No reference tree in {path:?}.");
                std::process::exit(2);
            }
        },
        Err(e) => {
            error!("Failed to read reference {path:?}: {e}");
            std::process::exit(2);
        }
    }
}

/// Newick lines of one rooted input, with the MAD statistics comment
/// inserted before the final `;` when requested.
fn output_lines(rooted: &Rooted, stats: bool) -> tree_rooting::Result<Vec<String>> {
    let annotations = match (&rooted.diagnostics, stats) {
        (Diagnostics::Mad { annotations, .. }, true) => Some(annotations),
        _ => None,
    };

    rooted
        .trees
        .iter()
        .enumerate()
        .map(|(i, tree)| {
            let newick = tree.to_newick()?;
            Ok(match annotations.and_then(|a| a.get(i)) {
                Some(note) => {
                    let body = newick.trim_end().trim_end_matches(';');
                    format!("{body}{note};")
                }
                None => newick,
            })
        })
        .collect()
}
