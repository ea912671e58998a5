//! Static allowlist check: protected store writes appear only in the
//! modules the Writer Matrix names. The runtime guard enforces the same
//! table; this pins it at the source level so a new call site fails CI.

use std::fs;
use std::path::{Path, PathBuf};

/// (write method, files allowed to call it). The store implementations and
/// their tests are always allowed.
const PROTECTED_WRITES: &[(&str, &[&str])] = &[
    (".insert_grading(", &["src/settlement/mod.rs"]),
    (".set_signal_settlement(", &["src/settlement/mod.rs"]),
    (".append_audit(", &["src/audit.rs"]),
    (".insert_parlay_attempt(", &["src/parlay/mod.rs"]),
    (".insert_publish_record(", &["src/publish/mod.rs"]),
    (".mark_publish_posted(", &["src/publish/mod.rs"]),
    (
        ".store_game_decisions(",
        &["src/signals/mod.rs", "src/publish/mod.rs"],
    ),
    // publish tests flip the kill switch through the store fixture
    (".set_flag(", &["src/flags.rs", "src/sentinel.rs", "src/publish/mod.rs"]),
];

fn collect_rust_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, out);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("rs") {
            out.push(path);
        }
    }
}

#[test]
fn protected_collection_writes_are_limited_to_their_owners() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let src_root = repo_root.join("src");
    let mut files = Vec::new();
    collect_rust_files(&src_root, &mut files);

    let mut offenders = Vec::new();
    for file in files {
        let rel = file
            .strip_prefix(repo_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        // store implementations define and exercise the write surface
        if rel.starts_with("src/store/") {
            continue;
        }
        let content = fs::read_to_string(&file).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("//") {
                continue;
            }
            for (method, allowed) in PROTECTED_WRITES {
                if !trimmed.contains(method) {
                    continue;
                }
                if allowed.iter().any(|a| *a == rel) {
                    continue;
                }
                offenders.push(format!("{rel}:{}: {}", idx + 1, trimmed));
            }
        }
    }

    assert!(
        offenders.is_empty(),
        "protected store write outside its owning module:\n{}",
        offenders.join("\n")
    );
}

#[test]
fn grading_collection_has_a_single_writer_caller() {
    // the settlement engine must be the only module naming itself as the
    // grading writer
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let src_root = repo_root.join("src");
    let mut files = Vec::new();
    collect_rust_files(&src_root, &mut files);

    let mut offenders = Vec::new();
    for file in files {
        let rel = file
            .strip_prefix(repo_root)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        if rel.starts_with("src/store/") || rel == "src/settlement/mod.rs" {
            continue;
        }
        let content = fs::read_to_string(&file).unwrap_or_default();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.contains("Caller::SettlementEngine") && trimmed.contains("insert_grading") {
                offenders.push(format!("{rel}:{}: {}", idx + 1, trimmed));
            }
        }
    }

    assert!(
        offenders.is_empty(),
        "grading writes claimed outside the settlement engine:\n{}",
        offenders.join("\n")
    );
}
