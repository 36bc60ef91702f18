//! Build script for installer-session
//!
//! Stamps the binary with when and from which commit it was built; `main`
//! prints these in its startup banner.

use std::process::Command;

/// First line of a command's stdout, `None` if it cannot run
fn command_line_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    output.status.success().then(|| {
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    })
}

fn main() {
    let stamps = [
        ("BUILD_DATE", command_line_output("date", &["+%Y-%m-%d"]), "unknown"),
        ("BUILD_TIME", command_line_output("date", &["+%H:%M:%S"]), ""),
        (
            "GIT_HASH",
            command_line_output("git", &["rev-parse", "--short", "HEAD"]),
            "unknown",
        ),
    ];

    for (key, value, fallback) in stamps {
        println!(
            "cargo:rustc-env={}={}",
            key,
            value.as_deref().unwrap_or(fallback)
        );
    }

    // A new commit changes GIT_HASH
    println!("cargo:rerun-if-changed=.git/HEAD");
}
