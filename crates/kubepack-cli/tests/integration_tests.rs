//! Integration tests for CLI commands

use std::process::Command;

/// Helper to run the kubepack binary
fn kubepack(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_kubepack"))
        .args(args)
        .output()
        .expect("Failed to execute kubepack")
}

#[test]
fn test_version_command() {
    let output = kubepack(&["version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_apply_without_source_fails_with_exit_code_1() {
    let output = kubepack(&["apply"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no source"), "stderr: {stderr}");
}

#[test]
fn test_delete_rejects_source_and_package_argument() {
    let output = kubepack(&["delete", "mypkg", "-f", "manifest.yaml"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("mutually exclusive"), "stderr: {stderr}");
}

#[test]
fn test_exclusive_source_flags_are_rejected() {
    let output = kubepack(&["apply", "-f", "a.yaml", "-k", "overlay"]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_manifest_labels_loaded_resources() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut file,
        b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: myconfig\n  namespace: myns\n",
    )
    .unwrap();

    let output = kubepack(&[
        "manifest",
        "-f",
        file.path().to_str().unwrap(),
        "--name",
        "mypkg",
    ]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("---\n"));
    assert!(stdout.contains("app.kubernetes.io/part-of: mypkg"));
    assert!(stdout.contains("app.kubernetes.io/managed-by: kubepack"));
    assert!(stdout.contains("kubepack.dev/namespaces: myns"));
}

#[test]
fn test_manifest_requires_name_or_labels() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut file,
        b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: myconfig\n",
    )
    .unwrap();

    let output = kubepack(&["manifest", "-f", file.path().to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("app.kubernetes.io/part-of"), "stderr: {stderr}");
}
