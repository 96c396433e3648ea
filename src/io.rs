//! Reading and writing Newick tree files.
//!
//! A file (or stdin, for `-`) holds any number of `;`-terminated Newick
//! trees. Paths ending in `.gz` are read and written through `flate2`.

use crate::error::Result;
use crate::tree::Tree;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use log::debug;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Whole contents of a plain or gzip file, or of stdin for `-`.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let p = path.as_ref();
    let mut input: Box<dyn Read> = if is_stdio(p) {
        Box::new(io::stdin().lock())
    } else if is_gz(p) {
        Box::new(MultiGzDecoder::new(BufReader::new(File::open(p)?)))
    } else {
        Box::new(BufReader::new(File::open(p)?))
    };
    let mut content = String::new();
    input.read_to_string(&mut content)?;
    Ok(content)
}

/// Split text into single Newick strings, each ending with `;`.
///
/// Semicolons inside quoted labels or `[...]` comments do not end a tree.
/// Whitespace between trees is dropped, and so is trailing text without a
/// terminating `;`.
pub fn split_newick_strings(content: &str) -> Vec<String> {
    let mut trees = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut comment_depth = 0usize;

    for ch in content.chars() {
        current.push(ch);
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') if comment_depth == 0 => quote = Some(ch),
            (None, '[') => comment_depth += 1,
            (None, ']') => comment_depth = comment_depth.saturating_sub(1),
            (None, ';') if comment_depth == 0 => {
                let tree = current.trim();
                if tree.len() > 1 {
                    trees.push(tree.to_string());
                }
                current.clear();
            }
            _ => {}
        }
    }
    trees
}

/// Read every tree of a file. The outer `Result` fails when the file cannot
/// be read; each tree then parses, or fails, on its own.
///
/// # Example
/// ```no_run
/// # use tree_rooting::io::read_newick_trees;
/// let trees = read_newick_trees("trees.nwk.gz").unwrap();
/// for tree in trees.iter().flatten() {
///     println!("{} leaves", tree.leaf_count());
/// }
/// ```
pub fn read_newick_trees<P: AsRef<Path>>(path: P) -> Result<Vec<Result<Tree>>> {
    let content = read_text(path.as_ref())?;
    let trees: Vec<Result<Tree>> = split_newick_strings(&content)
        .iter()
        .map(|newick| Tree::from_newick(newick))
        .collect();
    debug!("read {} trees from {:?}", trees.len(), path.as_ref());
    Ok(trees)
}

/// Write one line per entry to a file or stdout (`-`).
/// If `path` ends with `.gz`, the output is gzip-compressed.
pub fn write_lines<P: AsRef<Path>, S: AsRef<str>>(path: P, lines: &[S]) -> Result<()> {
    let p = path.as_ref();
    let mut out: Box<dyn Write> = if is_stdio(p) {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else if is_gz(p) {
        let enc = GzEncoder::new(File::create(p)?, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    for line in lines {
        writeln!(&mut out, "{}", line.as_ref())?;
    }
    out.flush()?;
    Ok(())
}
