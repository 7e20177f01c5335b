#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]
#![cfg(test)]

use std::process::{Command, Output};

fn memgrind(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_memgrind"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

fn stderr_lines(output: &Output) -> Vec<String> {
    String::from_utf8(output.stderr.clone())
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect()
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

/// Returns the single `free:` diagnostic, checking its call-site suffix.
#[track_caller]
fn free_diagnostic(output: &Output) -> String {
    let lines = stderr_lines(output);
    let diagnostics = lines
        .iter()
        .filter(|line| line.starts_with("free: "))
        .collect::<Vec<_>>();
    assert_eq!(diagnostics.len(), 1, "stderr: {lines:#?}");
    let line = diagnostics[0];

    let (_, site) = line.rsplit_once(" (").unwrap();
    let site = site.strip_suffix(')').unwrap();
    let (file, line_no) = site.rsplit_once(':').unwrap();
    assert!(file.ends_with("src/scenario.rs"), "{line}");
    assert!(line_no.parse::<u32>().unwrap() > 0, "{line}");
    line.clone()
}

#[test]
fn invalid_pointer_is_fatal() {
    let output = memgrind(&["--quiet", "misuse", "invalid-pointer"]);
    assert_eq!(output.status.code(), Some(2));
    let diagnostic = free_diagnostic(&output);
    assert!(
        diagnostic.starts_with("free: invalid pointer 0x100000 ("),
        "{diagnostic}"
    );
    assert!(stderr_lines(&output).contains(&"8 leaked in 1 objects.".to_owned()));
}

#[test]
fn pointer_into_chunk_is_fatal() {
    let output = memgrind(&["--quiet", "misuse", "not-chunk-start"]);
    assert_eq!(output.status.code(), Some(2));
    let diagnostic = free_diagnostic(&output);
    assert!(
        diagnostic.starts_with(
            "free: pointer 0x1c is not at the start of a chunk (chunk starts at 0x18) ("
        ),
        "{diagnostic}"
    );
    assert!(stderr_lines(&output).contains(&"8 leaked in 1 objects.".to_owned()));
}

#[test]
fn double_free_is_fatal() {
    let output = memgrind(&["--quiet", "misuse", "double-free"]);
    assert_eq!(output.status.code(), Some(2));
    let diagnostic = free_diagnostic(&output);
    assert!(
        diagnostic.starts_with("free: double free of pointer 0x18 ("),
        "{diagnostic}"
    );
    // The block was released once, so nothing is left over.
    assert!(
        !stderr_lines(&output)
            .iter()
            .any(|line| line.contains("leaked in"))
    );
}

#[test]
fn leak_report_counts_objects() {
    let output = memgrind(&["--quiet", "leak"]);
    assert!(output.status.success());
    assert_eq!(stderr_lines(&output), ["2560 leaked in 64 objects."]);

    let output = memgrind(&["--quiet", "leak", "--objects", "3", "--size", "5"]);
    assert!(output.status.success());
    assert_eq!(stderr_lines(&output), ["24 leaked in 3 objects."]);
}

#[test]
fn failed_malloc_names_call_site() {
    let output = memgrind(&["--quiet", "leak", "--objects", "65"]);
    assert_eq!(output.status.code(), Some(1));
    let lines = stderr_lines(&output);
    let diagnostic = lines
        .iter()
        .find(|line| line.starts_with("malloc: "))
        .unwrap();
    assert!(
        diagnostic.starts_with("malloc: not enough memory to allocate 40 bytes ("),
        "{diagnostic}"
    );
    assert!(diagnostic.contains("src/scenario.rs:"), "{diagnostic}");
    assert!(lines.contains(&"2560 leaked in 64 objects.".to_owned()));
    assert!(lines.iter().any(|line| line.starts_with("Error: ")));
}

#[test]
fn memtest_passes() {
    let output = memgrind(&["--quiet", "memtest"]);
    assert!(output.status.success(), "{:#?}", stderr_lines(&output));
    let stdout = stdout_text(&output);
    assert!(stdout.contains("0 incorrect bytes"));
    assert!(stdout.contains("All tests completed."));
    // Objects from the leak detection test are never freed.
    assert_eq!(stderr_lines(&output), ["2560 leaked in 64 objects."]);
}

#[test]
fn memtest_leak_mode() {
    let output = memgrind(&["--quiet", "memtest", "--leak"]);
    assert!(output.status.success());
    assert_eq!(stderr_lines(&output), ["2560 leaked in 64 objects."]);
}

#[test]
fn grind_leaves_heap_empty() {
    let output = memgrind(&["--quiet", "grind", "--runs", "3", "--seed", "42"]);
    assert!(output.status.success(), "{:#?}", stderr_lines(&output));
    let stdout = stdout_text(&output);
    assert_eq!(stdout.lines().count(), 5);
    assert!(stderr_lines(&output).is_empty());
}
