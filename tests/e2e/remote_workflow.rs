//! E2E Scenario: manage project remotes and use them by name.

use super::fixture::E2EFixture;

#[test]
fn test_named_directory_remote() {
    let mut fixture = E2EFixture::new("named_directory_remote");
    fixture.write_example_source();
    let remote_arg = fixture.root.join("shared").display().to_string();

    fixture.log_step("Add a directory remote");
    let output = fixture.run(&["remote", "add", "shared", &remote_arg, "--directory"]);
    fixture.assert_success(&output, "remote add");
    assert!(fixture.root.join(".bundlekit").join("config.toml").is_file());

    fixture.log_step("List remotes");
    let output = fixture.run(&["--robot", "remote", "list"]);
    fixture.assert_success(&output, "remote list");
    let remotes = output.json();
    assert_eq!(remotes[0]["name"], "shared");
    assert_eq!(remotes[0]["accessors"][0]["kind"], "directory");

    fixture.log_step("Install and deploy to every configured remote");
    let output = fixture.run(&["install", "src/bundle.yaml", "-g", "src/graph.nq"]);
    fixture.assert_success(&output, "install");
    let bundle_dir = fixture
        .bundles_root
        .join("example%2Fbundle")
        .join("1")
        .display()
        .to_string();
    let output = fixture.run(&["deploy", &bundle_dir]);
    fixture.assert_success(&output, "deploy");

    fixture.log_step("Fetch into a second store by remote name");
    let second_store = fixture.root.join("store2");
    let output = fixture.run_with_store(
        &second_store,
        &["fetch", "example/bundle", "--remote", "shared"],
    );
    fixture.assert_success(&output, "fetch by name");

    fixture.log_step("Unknown remote names are rejected");
    let output = fixture.run(&["--robot", "fetch", "example/bundle", "--remote", "nope"]);
    assert!(!output.success);
    assert_eq!(output.json()["category"], "config");

    fixture.log_step("Remove the remote");
    let output = fixture.run(&["remote", "remove", "shared"]);
    fixture.assert_success(&output, "remote remove");
    let output = fixture.run(&["remote", "remove", "shared"]);
    assert!(!output.success);
    let output = fixture.run(&["remote", "list"]);
    fixture.assert_output_contains(&output, "No remotes configured");

    fixture.generate_report();
}

#[test]
fn test_show_fetches_from_configured_remote() {
    let mut fixture = E2EFixture::new("show_fetch");
    fixture.write_example_source();
    let remote_arg = fixture.root.join("shared").display().to_string();

    let output = fixture.run(&["remote", "add", "shared", &remote_arg, "--directory"]);
    fixture.assert_success(&output, "remote add");
    let output = fixture.run(&["install", "src/bundle.yaml", "-g", "src/graph.nq"]);
    fixture.assert_success(&output, "install");
    let bundle_dir = fixture
        .bundles_root
        .join("example%2Fbundle")
        .join("1")
        .display()
        .to_string();
    let output = fixture.run(&["deploy", &bundle_dir]);
    fixture.assert_success(&output, "deploy");

    fixture.log_step("Show in an empty store without --fetch fails");
    let second_store = fixture.root.join("store2");
    let output = fixture.run_with_store(&second_store, &["show", "example/bundle"]);
    assert!(!output.success);

    fixture.log_step("Show with --fetch pulls the bundle");
    let output = fixture.run_with_store(
        &second_store,
        &["--robot", "show", "example/bundle", "--fetch"],
    );
    fixture.assert_success(&output, "show --fetch");
    assert_eq!(output.json()["manifest"]["version"], 1);

    fixture.generate_report();
}
