//! Static check: consumers render decisions verbatim.
//!
//! The decision computer is the only module allowed to derive edges, fair
//! lines, sides, or vig-free probabilities. The API surface and the
//! publisher consume finished decisions; any of these calls appearing
//! there means a consumer started recomputing model arithmetic.

use std::fs;
use std::path::{Path, PathBuf};

/// Decision-computer-only operations.
const FORBIDDEN_IN_CONSUMERS: &[&str] = &[
    "remove_vig_pair(",
    "american_implied_prob(",
    "cover_prob_home(",
    "over_prob(",
    "prob_to_american(",
    ".mean_margin",
    ".margin_hist",
    ".total_hist",
    "selection_id(\"",
];

/// Consumer modules: they may read decision fields, never derive them.
const CONSUMER_ROOTS: &[&str] = &["src/api", "src/publish"];

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
fn consumers_never_recompute_decision_arithmetic() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR"));

    let mut offenders = Vec::new();
    for consumer_root in CONSUMER_ROOTS {
        let mut files = Vec::new();
        collect_rust_files(&repo_root.join(consumer_root), &mut files);

        for file in files {
            let rel = file
                .strip_prefix(repo_root)
                .unwrap_or(&file)
                .to_string_lossy()
                .replace('\\', "/");
            let content = fs::read_to_string(&file).unwrap_or_default();
            for (idx, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.starts_with("//") {
                    continue;
                }
                for pattern in FORBIDDEN_IN_CONSUMERS {
                    if trimmed.contains(pattern) {
                        offenders.push(format!("{rel}:{}: {}", idx + 1, trimmed));
                    }
                }
            }
        }
    }

    assert!(
        offenders.is_empty(),
        "consumer module recomputes decision arithmetic:\n{}",
        offenders.join("\n")
    );
}
