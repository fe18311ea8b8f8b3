//! E2E Scenario: install, inspect and verify a bundle.

use super::fixture::E2EFixture;

#[test]
fn test_install_list_show_verify() {
    let mut fixture = E2EFixture::new("install_list_show_verify");
    fixture.write_example_source();

    fixture.log_step("Install from descriptor");
    let output = fixture.run(&[
        "--robot",
        "install",
        "src/bundle.yaml",
        "--graph",
        "src/graph.nq",
    ]);
    fixture.assert_success(&output, "install");
    let json = output.json();
    assert_eq!(json["id"], "example/bundle");
    assert_eq!(json["version"], 1);
    assert_eq!(json["contexts"], serde_json::json!(["http://example.org/ctx/a"]));
    assert_eq!(json["files"], serde_json::json!(["README.md"]));

    let directory = fixture.bundles_root.join("example%2Fbundle").join("1");
    assert!(directory.join("manifest").is_file());
    assert!(directory.join("files").join("README.md").is_file());

    fixture.log_step("List installed bundles");
    let output = fixture.run(&["--robot", "list"]);
    fixture.assert_success(&output, "list");
    let listed = output.json();
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["manifest"]["id"], "example/bundle");

    fixture.log_step("Show bundle (human)");
    let output = fixture.run(&["show", "example/bundle"]);
    fixture.assert_success(&output, "show");
    fixture.assert_output_contains(&output, "http://example.org/ctx/a");
    fixture.assert_output_contains(&output, "README.md");

    fixture.log_step("Verify untouched bundle");
    let output = fixture.run(&["verify", "example/bundle"]);
    fixture.assert_success(&output, "verify");
    fixture.assert_output_contains(&output, "ok");

    fixture.log_step("Tamper with a file and verify again");
    std::fs::write(directory.join("files").join("README.md"), "tampered\n")
        .expect("Failed to tamper");
    let output = fixture.run(&["--robot", "verify", "example/bundle"]);
    assert!(!output.success, "verify should fail after tampering");
    assert!(output.stdout.contains("\"problems\""));
    assert!(output.stdout.contains("security"));

    fixture.generate_report();
}

#[test]
fn test_install_missing_include_leaves_nothing_behind() {
    let mut fixture = E2EFixture::new("install_missing_include");
    fixture.write_example_source();
    std::fs::remove_file(fixture.root.join("src/README.md")).expect("Failed to remove file");

    fixture.log_step("Install with a missing explicit include");
    let output = fixture.run(&["install", "src/bundle.yaml", "-g", "src/graph.nq"]);
    assert!(!output.success);
    fixture.assert_output_contains(&output, "README.md");

    let directory = fixture.bundles_root.join("example%2Fbundle").join("1");
    assert!(!directory.join("manifest").exists());
    assert!(!directory.join("files").exists());

    fixture.log_step("Nothing is listed");
    let output = fixture.run(&["--robot", "list"]);
    fixture.assert_success(&output, "list");
    assert_eq!(output.json(), serde_json::json!([]));

    fixture.generate_report();
}

#[test]
fn test_uncovered_import_fails_install() {
    let mut fixture = E2EFixture::new("uncovered_import");
    fixture.write_example_source();
    fixture.write_file(
        "src/imports.nq",
        "<http://example.org/ctx/a> <http://www.w3.org/2002/07/owl#imports> <http://example.org/ctx/b> <http://example.org/imports> .\n",
    );

    fixture.log_step("Install with an import nothing covers");
    let output = fixture.run(&[
        "--robot",
        "install",
        "src/bundle.yaml",
        "-g",
        "src/graph.nq",
        "-g",
        "src/imports.nq",
        "--imports-context",
        "http://example.org/imports",
    ]);
    assert!(!output.success);
    let json = output.json();
    assert_eq!(json["category"], "install_failed");
    assert!(
        json["message"]
            .as_str()
            .unwrap_or_default()
            .contains("http://example.org/ctx/b")
    );

    fixture.generate_report();
}
