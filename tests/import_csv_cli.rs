use std::process::Command;

#[test]
fn import_csv_without_files_exits_with_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_import_csv"))
        .env_remove("DATABASE_URL")
        .output()
        .expect("binary runs");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("pass at least one --users or --teams file"),
        "unexpected stderr: {stderr}"
    );
}
