// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/index");
    println!("cargo::rerun-if-env-changed=QSEND_VERSION");

    let version = std::env::var("QSEND_VERSION").unwrap_or_else(|_| describe());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `<crate version>+<short hash>[.dirty]`, or the bare crate version when
/// building outside a git checkout (release tarballs)
fn describe() -> String {
    let base = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let Some(hash) = git(&["rev-parse", "--short", "HEAD"]) else {
        return base;
    };
    let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
        .is_some_and(|status| !status.is_empty());
    if dirty {
        format!("{}+{}.dirty", base, hash)
    } else {
        format!("{}+{}", base, hash)
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
