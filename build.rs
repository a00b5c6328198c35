//! Reject lint-suppression attributes ("#[" + "allow" + ...) anywhere in the
//! searchcore workspace sources. Set CHECK_NO_ALLOW=0 to skip.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CHECKED: [&str; 6] = [
    "src",
    "tests",
    "demos",
    "searchcore-types/src",
    "searchcore-memory/src",
    "searchcore-testing/src",
];

const IGNORED_DIRS: [&str; 3] = ["target", ".git", "vendor"];

struct Violation {
    file: PathBuf,
    line: usize,
    content: String,
}

fn main() {
    println!("cargo:rerun-if-env-changed=CHECK_NO_ALLOW");
    if env::var("CHECK_NO_ALLOW").is_ok_and(|v| v == "0") {
        return;
    }

    let root = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("manifest dir"));
    let mut violations = Vec::new();
    for relative in CHECKED {
        let path = root.join(relative);
        if path.exists() {
            println!("cargo:rerun-if-changed={}", path.display());
            scan(&path, &mut violations);
        }
    }

    if violations.is_empty() {
        return;
    }

    eprintln!("ERROR: lint suppression attributes found in searchcore:");
    for violation in &violations {
        eprintln!(
            "  {}:{}: {}",
            violation.file.display(),
            violation.line,
            violation.content.trim()
        );
    }
    panic!("{} lint suppression attribute(s) are forbidden", violations.len());
}

fn scan(path: &Path, violations: &mut Vec<Violation>) {
    if path.is_dir() {
        if IGNORED_DIRS.iter().any(|dir| path.ends_with(dir)) {
            return;
        }
        for entry in fs::read_dir(path).expect("read dir") {
            scan(&entry.expect("dir entry").path(), violations);
        }
        return;
    }

    if path.extension().map_or(true, |ext| ext != "rs") {
        return;
    }

    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    violations.extend(
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains("#[allow") || line.contains("#![allow"))
            .map(|(idx, line)| Violation {
                file: path.to_path_buf(),
                line: idx + 1,
                content: line.to_string(),
            }),
    );
}
