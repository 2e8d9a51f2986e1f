//! End-to-end pipeline tests: build, package, install, remove against a
//! scratch installation root.

mod helpers;

use helpers::{assert_absent, assert_file_exists, tool_available, TestEnv};
use pbuild::build;
use pbuild::error::Error;
use pbuild::registry::Registry;
use pbuild::remove;
use std::fs;

const HELLO_RECIPE: &str = "\
name=[hello]
version=[1.0]
source_url=[http://example.org/hello-1.0.tar.gz]
install_cmd=[mkdir -p $DESTDIR/usr/bin && cp hello $DESTDIR/usr/bin/hello]
";

fn hello_env() -> TestEnv {
    let env = TestEnv::new();
    env.make_source_tarball("hello-1.0", &[("hello", "#!/bin/sh\necho hello\n")]);
    env
}

#[test]
fn test_build_trivial_package() {
    let env = hello_env();
    let recipe = env.write_recipe("hello-1.0.pbuild", HELLO_RECIPE);

    let package = build::build_recipe(&recipe, &env.config, false).unwrap();

    // archive at the canonical path
    assert_eq!(package, env.config.pkgout.join("hello-1.0.tar.gz"));
    assert_file_exists(&package);

    // file landed under the installation root
    assert_file_exists(&env.rooted("/usr/bin/hello"));

    // manifest holds exactly the installed file
    assert_eq!(
        env.registry_file("hello.files").as_deref(),
        Some("/usr/bin/hello\n")
    );

    // metadata record exists and carries the recipe path
    let meta = env.registry_file("hello.META").unwrap();
    assert!(meta.contains("name=hello"));
    assert!(meta.contains("version=1.0"));
    assert!(meta.contains(&recipe.display().to_string()));
}

#[test]
fn test_remove_erases_manifest_files_only() {
    let env = hello_env();
    let recipe = env.write_recipe("hello-1.0.pbuild", HELLO_RECIPE);
    build::build_recipe(&recipe, &env.config, false).unwrap();

    // another package's file keeps /usr/bin alive
    fs::write(env.rooted("/usr/bin/other"), "keep").unwrap();

    remove::remove("hello", &env.config).unwrap();

    assert_absent(&env.rooted("/usr/bin/hello"));
    assert!(env.registry_file("hello.files").is_none());
    assert!(env.registry_file("hello.META").is_none());
    assert_file_exists(&env.rooted("/usr/bin/other"));
    assert_file_exists(&env.rooted("/usr/bin"));
}

#[test]
fn test_remove_prunes_emptied_directories() {
    let env = TestEnv::new();
    env.make_source_tarball("doc-1.0", &[("README", "docs\n")]);
    let recipe = env.write_recipe(
        "doc-1.0.pbuild",
        "\
name=[doc]
version=[1.0]
source_url=[http://example.org/doc-1.0.tar.gz]
install_cmd=[mkdir -p $DESTDIR/usr/share/doc/doc && cp README $DESTDIR/usr/share/doc/doc/]
",
    );
    build::build_recipe(&recipe, &env.config, false).unwrap();
    assert_file_exists(&env.rooted("/usr/share/doc/doc/README"));

    remove::remove("doc", &env.config).unwrap();

    // the whole emptied chain collapses, not just the leaf
    assert_absent(&env.rooted("/usr/share"));
}

#[test]
fn test_remove_unknown_package() {
    let env = TestEnv::new();
    let err = remove::remove("ghost", &env.config).unwrap_err();
    assert!(matches!(err, Error::UnknownPackage(_)));
    assert_eq!(err.exit_code(), 7);
}

#[test]
fn test_checksum_gate_blocks_pipeline() {
    let env = hello_env();
    let recipe = env.write_recipe(
        "hello-1.0.pbuild",
        &format!("{}checksum=[0000]\n", HELLO_RECIPE),
    );

    let err = build::build_recipe(&recipe, &env.config, false).unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { .. }));
    assert_eq!(err.exit_code(), 3);

    // nothing extracted, installed, or registered
    assert_absent(&env.config.tmproot.join("hello-1.0/src"));
    assert_absent(&env.rooted("/usr/bin/hello"));
    assert_absent(&env.config.pkgout.join("hello-1.0.tar.gz"));
    assert!(env.registry_file("hello.files").is_none());
}

#[test]
fn test_patch_failure_aborts_after_extraction() {
    if !tool_available("patch") {
        eprintln!("patch not available, skipping");
        return;
    }

    let env = hello_env();
    fs::write(
        env.config.sources.join("bad.patch"),
        "this is not a valid patch\n",
    )
    .unwrap();
    let recipe = env.write_recipe(
        "hello-1.0.pbuild",
        &format!("{}patches=[bad.patch]\n", HELLO_RECIPE),
    );

    let err = build::build_recipe(&recipe, &env.config, false).unwrap_err();
    assert!(matches!(err, Error::PatchFailed { .. }));
    assert_eq!(err.exit_code(), 5);

    // extraction happened, but no archive was produced
    assert_file_exists(&env.config.tmproot.join("hello-1.0/src/hello-1.0"));
    assert_absent(&env.config.pkgout.join("hello-1.0.tar.gz"));
}

#[test]
fn test_missing_patch_is_fatal() {
    let env = hello_env();
    let recipe = env.write_recipe(
        "hello-1.0.pbuild",
        &format!("{}patches=[nonexistent.patch]\n", HELLO_RECIPE),
    );
    let err = build::build_recipe(&recipe, &env.config, false).unwrap_err();
    assert!(matches!(err, Error::PatchFailed { .. }));
}

#[test]
fn test_unsupported_archive_extension() {
    let env = TestEnv::new();
    fs::write(env.config.sources.join("odd-1.0.rar"), "rar bytes").unwrap();
    let recipe = env.write_recipe(
        "odd-1.0.pbuild",
        "\
name=[odd]
version=[1.0]
source_url=[http://example.org/odd-1.0.rar]
install_cmd=[true]
",
    );

    let err = build::build_recipe(&recipe, &env.config, false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedArchive(_)));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_build_cmd_and_makeflags() {
    let env = TestEnv::new();
    env.make_source_tarball("flags-1.0", &[("placeholder", "")]);
    let recipe = env.write_recipe(
        "flags-1.0.pbuild",
        "\
name=[flags]
version=[1.0]
source_url=[http://example.org/flags-1.0.tar.gz]
build_cmd=[echo \"$MAKEFLAGS\" > makeflags.txt]
install_cmd=[mkdir -p $DESTDIR/opt && cp makeflags.txt $DESTDIR/opt/]
",
    );

    build::build_recipe(&recipe, &env.config, false).unwrap();

    // JOBS=3 in the test config and no inherited MAKEFLAGS
    let flags = fs::read_to_string(env.rooted("/opt/makeflags.txt")).unwrap();
    assert_eq!(flags.trim(), "-j3");
}

#[test]
fn test_check_cmd_failure_is_fatal() {
    let env = TestEnv::new();
    env.make_source_tarball("failing-1.0", &[("placeholder", "")]);
    let recipe = env.write_recipe(
        "failing-1.0.pbuild",
        "\
name=[failing]
version=[1.0]
source_url=[http://example.org/failing-1.0.tar.gz]
check_cmd=[false]
install_cmd=[true]
",
    );

    let err = build::build_recipe(&recipe, &env.config, false).unwrap_err();
    assert!(matches!(err, Error::TestFailed { .. }));
    assert_absent(&env.config.pkgout.join("failing-1.0.tar.gz"));
}

#[test]
fn test_failed_build_surfaces_log_path() {
    let env = TestEnv::new();
    env.make_source_tarball("broken-1.0", &[("placeholder", "")]);
    let recipe = env.write_recipe(
        "broken-1.0.pbuild",
        "\
name=[broken]
version=[1.0]
source_url=[http://example.org/broken-1.0.tar.gz]
build_cmd=[echo compile error >&2; false]
install_cmd=[true]
",
    );

    let err = build::build_recipe(&recipe, &env.config, false).unwrap_err();
    let log = env.config.tmproot.join("broken-1.0/build.log");
    assert!(err.to_string().contains(&log.display().to_string()));

    // the child's stderr was captured into the log
    let content = fs::read_to_string(&log).unwrap();
    assert!(content.contains("compile error"));
}

#[test]
fn test_rebuilds_produce_identical_manifests() {
    let env = hello_env();
    let recipe = env.write_recipe("hello-1.0.pbuild", HELLO_RECIPE);

    build::build_recipe(&recipe, &env.config, false).unwrap();
    let first = env.registry_file("hello.files").unwrap();

    build::build_recipe(&recipe, &env.config, false).unwrap();
    let second = env.registry_file("hello.files").unwrap();

    assert_eq!(first, second);
    assert_file_exists(&env.rooted("/usr/bin/hello"));
}

#[test]
fn test_install_standalone_archive() {
    let env = hello_env();
    let recipe = env.write_recipe("hello-1.0.pbuild", HELLO_RECIPE);
    let package = build::build_recipe(&recipe, &env.config, false).unwrap();

    // wipe the root and registry, then install from the archive alone
    fs::remove_dir_all(&env.config.root).unwrap();
    fs::create_dir_all(&env.config.root).unwrap();
    let registry = Registry::open(&env.config.registry);
    registry.drop("hello").unwrap();

    pbuild::install::install_file(&package, &env.config).unwrap();

    assert_file_exists(&env.rooted("/usr/bin/hello"));
    assert_eq!(
        env.registry_file("hello.files").as_deref(),
        Some("/usr/bin/hello\n")
    );
    let meta = env.registry_file("hello.META").unwrap();
    assert!(meta.contains("name=hello"));
    assert!(meta.contains("version=1.0"));
}

#[test]
fn test_hooks_run_after_remove() {
    let env = hello_env();
    let recipe = env.write_recipe("hello-1.0.pbuild", HELLO_RECIPE);
    build::build_recipe(&recipe, &env.config, false).unwrap();

    fs::create_dir_all(&env.config.hooks).unwrap();
    let marker = env._temp_dir.path().join("hook-ran");
    let hook = env.config.hooks.join("10-record");
    fs::write(
        &hook,
        format!("#!/bin/sh\necho \"$1\" > {}\n", marker.display()),
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();
    }

    remove::remove("hello", &env.config).unwrap();

    let recorded = fs::read_to_string(&marker).unwrap();
    assert_eq!(recorded.trim(), "hello");
}
