use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use devloop::watch::{ExclusionRules, ExclusionSpec, Watcher, WatcherConfig};
use proptest::prelude::*;
use tempfile::tempdir;

fn rules(globs: &[&str], regexes: &[&str]) -> ExclusionRules {
    ExclusionRules::new(&ExclusionSpec {
        globs: globs.iter().map(|s| s.to_string()).collect(),
        regexes: regexes.iter().map(|s| s.to_string()).collect(),
    })
    .unwrap()
}

fn watcher(root: &Path, exclusions: ExclusionRules) -> Watcher {
    Watcher::new(WatcherConfig {
        root: root.to_path_buf(),
        exclusions,
    })
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

// Keep writes clear of the previous check time on coarse-mtime filesystems.
fn tick() {
    sleep(Duration::from_millis(20));
}

#[test]
fn warm_up_reports_nothing_even_for_existing_files() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.go", "package main");
    write(dir.path(), "web/index.html", "<html></html>");

    let w = watcher(dir.path(), ExclusionRules::empty());
    assert!(w.changes().unwrap().is_empty());
}

#[test]
fn new_files_are_reported_once() {
    let dir = tempdir().unwrap();
    let w = watcher(dir.path(), ExclusionRules::empty());
    w.changes().unwrap();
    tick();

    write(dir.path(), "main.go", "package main");
    assert_eq!(w.changes().unwrap(), vec!["main.go".to_string()]);
    assert!(w.changes().unwrap().is_empty());
}

#[test]
fn whitespace_only_edits_are_ignored() {
    let dir = tempdir().unwrap();
    let w = watcher(dir.path(), ExclusionRules::empty());
    w.changes().unwrap();
    tick();

    write(dir.path(), "main.go", "package main");
    assert_eq!(w.changes().unwrap(), vec!["main.go".to_string()]);
    tick();

    write(dir.path(), "main.go", "\n\n  package main \t\n");
    assert!(w.changes().unwrap().is_empty());
    tick();

    write(dir.path(), "main.go", "package app");
    assert_eq!(w.changes().unwrap(), vec!["main.go".to_string()]);
}

#[test]
fn excluded_paths_are_never_reported() {
    let dir = tempdir().unwrap();
    let w = watcher(dir.path(), rules(&["node_modules/**"], &[r"^\.", r"\.log$"]));
    w.changes().unwrap();
    tick();

    write(dir.path(), "node_modules/pkg/index.js", "x");
    write(dir.path(), ".git/HEAD", "ref");
    write(dir.path(), "server.log", "line");
    write(dir.path(), "src/app.js", "app");

    assert_eq!(w.changes().unwrap(), vec!["src/app.js".to_string()]);
}

fn rel_path() -> impl Strategy<Value = String> {
    (
        any::<bool>(),
        prop::collection::vec("[a-z]{1,6}", 0..3),
        "[a-z]{1,6}",
        prop_oneof![Just(".rs"), Just(".tmp"), Just(".html")],
    )
        .prop_map(|(skip, dirs, stem, ext)| {
            let mut parts = Vec::new();
            if skip {
                parts.push("skip".to_string());
            }
            parts.extend(dirs);
            parts.push(format!("{stem}{ext}"));
            parts.join("/")
        })
}

proptest! {
    #[test]
    fn glob_or_regex_match_excludes(path in rel_path()) {
        let r = rules(&["skip/**"], &[r"\.tmp$"]);
        let expected = path.starts_with("skip/") || path.ends_with(".tmp");
        prop_assert_eq!(r.is_excluded(&path), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn reported_set_is_exactly_the_unexcluded_writes(
        paths in prop::collection::btree_set(rel_path(), 1..6)
    ) {
        let dir = tempdir().unwrap();
        let w = watcher(dir.path(), rules(&["skip/**"], &[r"\.tmp$"]));
        w.changes().unwrap();
        tick();

        for p in &paths {
            write(dir.path(), p, p);
        }

        let expected: BTreeSet<String> = paths
            .iter()
            .filter(|p| !(p.starts_with("skip/") || p.ends_with(".tmp")))
            .cloned()
            .collect();
        let reported: BTreeSet<String> = w.changes().unwrap().into_iter().collect();
        prop_assert_eq!(reported, expected);
    }
}
