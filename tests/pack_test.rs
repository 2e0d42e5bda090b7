//! Integration tests for `keg pack`

mod common;

use common::{combined, stdout, TestProject};

fn built_project() -> TestProject {
    let project = TestProject::new();
    project.add_formula(
        "zlib",
        &[],
        "mkdir -p $PREFIX/lib/pkgconfig && echo lib > $PREFIX/lib/libz.1.dylib \
         && ln -s libz.1.dylib $PREFIX/lib/libz.dylib && echo pc > $PREFIX/lib/pkgconfig/zlib.pc",
    );
    project.add_formula(
        "gnupg",
        &["zlib"],
        "mkdir -p $PREFIX/bin && echo gpg > $PREFIX/bin/gpg2",
    );
    let output = project.keg(&["build"]);
    assert!(output.status.success(), "{}", combined(&output));
    project
}

#[test]
fn test_pack_after_build() {
    let project = built_project();
    let output = project.keg(&["--json", "pack", "dist"]);
    assert!(output.status.success(), "{}", combined(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["packages"][0], "zlib");
    assert_eq!(json["symlinks"], 1);

    assert_eq!(project.read_file("dist/bin/gpg2").trim(), "gpg");
    let link = project.path().join("dist/lib/libz.dylib");
    assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(project.read_file("dist/lib/libz.dylib").trim(), "lib");
}

#[test]
fn test_pack_respects_excludes() {
    let project = TestProject::with_config(&format!(
        "{}\n[pack]\nexclude = [\"^lib/pkgconfig$\"]\n",
        common::SAMPLE_CONFIG
    ));
    project.add_formula(
        "zlib",
        &[],
        "mkdir -p $PREFIX/lib/pkgconfig && echo z > $PREFIX/lib/libz.a \
         && echo pc > $PREFIX/lib/pkgconfig/zlib.pc",
    );

    let output = project.keg(&["build"]);
    assert!(output.status.success(), "{}", combined(&output));
    let output = project.keg(&["pack", "dist"]);
    assert!(output.status.success(), "{}", combined(&output));

    assert!(project.file_exists("dist/lib/libz.a"));
    assert!(!project.file_exists("dist/lib/pkgconfig"));
}

#[test]
fn test_pack_refuses_existing_destination_without_prune() {
    let project = built_project();
    project.create_file("dist/stale.txt", "old");

    let output = project.keg(&["pack", "dist"]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("--prune"), "{}", combined(&output));
    assert!(project.file_exists("dist/stale.txt"));

    let output = project.keg(&["pack", "dist", "--prune"]);
    assert!(output.status.success(), "{}", combined(&output));
    assert!(!project.file_exists("dist/stale.txt"));
    assert!(project.file_exists("dist/bin/gpg2"));
}

#[test]
fn test_pack_before_build_fails() {
    let project = TestProject::new();
    project.add_installing_formula("zlib", &[]);

    let output = project.keg(&["pack", "dist"]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("not installed"), "{}", combined(&output));
    assert!(!project.file_exists("dist"));
}
