//! E2E Scenario: pack, deploy, fetch and unpack bundles between stores.

use super::fixture::E2EFixture;

fn install_example(fixture: &mut E2EFixture) {
    fixture.write_example_source();
    let output = fixture.run(&["install", "src/bundle.yaml", "-g", "src/graph.nq"]);
    fixture.assert_success(&output, "install");
}

#[test]
fn test_pack_deploy_fetch_roundtrip() {
    let mut fixture = E2EFixture::new("pack_deploy_fetch");
    install_example(&mut fixture);
    let remote_dir = fixture.root.join("remote");
    let remote_arg = remote_dir.display().to_string();

    fixture.log_step("Pack the installed bundle");
    let output = fixture.run(&["--robot", "pack", "example/bundle", "-o", "out"]);
    fixture.assert_success(&output, "pack");
    let archive = fixture.root.join("out").join("example%2Fbundle-1.tar.xz");
    assert!(archive.is_file());

    fixture.log_step("Deploy the archive to a directory remote");
    let archive_arg = archive.display().to_string();
    let output = fixture.run(&["--robot", "deploy", &archive_arg, "--dir", &remote_arg]);
    fixture.assert_success(&output, "deploy");
    let report = output.json();
    assert_eq!(report["id"], "example/bundle");
    assert_eq!(report["uploads"].as_array().map(Vec::len), Some(1));
    assert!(remote_dir.join("example%2Fbundle").join("1.tar.xz").is_file());

    fixture.log_step("Fetch into a second store");
    let second_store = fixture.root.join("store2");
    let output = fixture.run_with_store(
        &second_store,
        &["--robot", "fetch", "example/bundle", "--dir", &remote_arg],
    );
    fixture.assert_success(&output, "fetch");
    assert_eq!(output.json()["version"], 1);

    fixture.log_step("Fetched bundle verifies");
    let output = fixture.run_with_store(&second_store, &["verify", "example/bundle"]);
    fixture.assert_success(&output, "verify fetched bundle");

    fixture.log_step("Fetching again is a no-op");
    let output = fixture.run_with_store(
        &second_store,
        &["fetch", "example/bundle", "--version", "1", "--dir", &remote_arg],
    );
    fixture.assert_success(&output, "refetch");

    fixture.generate_report();
}

#[test]
fn test_deploy_bundle_directory() {
    let mut fixture = E2EFixture::new("deploy_directory");
    install_example(&mut fixture);
    let remote_arg = fixture.root.join("remote").display().to_string();
    let bundle_dir = fixture
        .bundles_root
        .join("example%2Fbundle")
        .join("1")
        .display()
        .to_string();

    fixture.log_step("Deploy an installed bundle directory");
    let output = fixture.run(&["deploy", &bundle_dir, "--dir", &remote_arg]);
    fixture.assert_success(&output, "deploy");
    fixture.assert_output_contains(&output, "example/bundle");

    fixture.log_step("Deploy a path that is not a bundle");
    let output = fixture.run(&["--robot", "deploy", "src", "--dir", &remote_arg]);
    assert!(!output.success);
    assert_eq!(output.json()["category"], "path_validation");

    fixture.generate_report();
}

#[test]
fn test_unpack_into_store_and_target() {
    let mut fixture = E2EFixture::new("unpack");
    install_example(&mut fixture);

    let output = fixture.run(&["pack", "example/bundle", "-o", "out"]);
    fixture.assert_success(&output, "pack");
    let archive = fixture
        .root
        .join("out")
        .join("example%2Fbundle-1.tar.xz")
        .display()
        .to_string();

    fixture.log_step("Unpack into a fresh store");
    let other_store = fixture.root.join("other");
    let output = fixture.run_with_store(&other_store, &["--robot", "unpack", &archive]);
    fixture.assert_success(&output, "unpack");
    assert!(
        other_store
            .join("example%2Fbundle")
            .join("1")
            .join("manifest")
            .is_file()
    );

    fixture.log_step("Unpack into an explicit target");
    let output = fixture.run(&["unpack", &archive, "--target", "extracted"]);
    fixture.assert_success(&output, "unpack target");
    assert!(fixture.root.join("extracted").join("files").join("README.md").is_file());

    fixture.log_step("Unpacking over an existing bundle fails");
    let output = fixture.run_with_store(&other_store, &["unpack", &archive]);
    assert!(!output.success);

    fixture.generate_report();
}

#[test]
fn test_fetch_without_remotes() {
    let mut fixture = E2EFixture::new("fetch_without_remotes");

    fixture.log_step("Fetch with nothing configured");
    let output = fixture.run(&["--robot", "fetch", "example/bundle"]);
    assert!(!output.success);
    let json = output.json();
    assert_eq!(json["category"], "not_found");
    assert_eq!(json["recoverable"], true);

    fixture.generate_report();
}
