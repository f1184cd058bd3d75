use std::{
    env, fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

const CONFIG: &str = r#"
[grid]
n_rows = 24
n_cols = 32

[model]
prob_vacant = 0.1
threshold = 0.3

[init]
seed = 12345

[output]
steps_per_save = 2
saves_per_file = 16
"#;

fn setup_dir(name: &str, config_contents: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    fs::write(test_dir.join("config.toml"), config_contents).expect("failed to write config file");

    test_dir
}

fn exec_bin(test_dir: &Path, args: &[&str]) -> Output {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_schelling"));
    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    Command::new(bin)
        .args(["--sim-dir", test_dir_str])
        .args(args)
        .output()
        .expect("failed to execute command")
}

fn run_bin(test_dir: &Path, args: &[&str]) {
    let output = exec_bin(test_dir, args);

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );
}

#[test]
fn basic_workflow() {
    let test_dir = setup_dir("basic_workflow", CONFIG);

    run_bin(&test_dir, &["create"]);
    run_bin(&test_dir, &["create"]);

    run_bin(&test_dir, &["resume", "--run-idx", "0"]);
    run_bin(&test_dir, &["resume", "--run-idx", "0"]);

    run_bin(&test_dir, &["resume", "--run-idx", "1"]);

    let run_dir = test_dir.join("run-0000");
    assert!(run_dir.join("checkpoint.msgpack").is_file());
    assert!(run_dir.join("trajectory-0002.msgpack").is_file());
    assert!(!test_dir.join("run-0001").join("trajectory-0002.msgpack").exists());

    run_bin(&test_dir, &["analyze"]);

    let results = fs::read_to_string(run_dir.join("results.json")).expect("failed to read results");
    let results: serde_json::Value =
        serde_json::from_str(&results).expect("failed to parse results");
    let reports = results.as_array().expect("results must be an array");
    assert_eq!(reports.len(), 4);
    assert_eq!(reports[0]["cell_fracs"]["vacant"]["n_vals"], 48);

    let satisfied_pct = reports[1]["satisfied_pct"]["mean"]
        .as_f64()
        .expect("mean satisfied percentage must be a number");
    assert!((0.0..=100.0).contains(&satisfied_pct));

    run_bin(&test_dir, &["clean"]);
    assert!(!run_dir.exists());
    assert!(test_dir.join("config.toml").is_file());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn seeded_runs_are_reproducible() {
    let test_dir = setup_dir("seeded_runs_are_reproducible", CONFIG);

    run_bin(&test_dir, &["create"]);
    run_bin(&test_dir, &["create"]);

    let read = |run: &str| {
        fs::read(test_dir.join(run).join("trajectory-0000.msgpack"))
            .expect("failed to read trajectory file")
    };
    assert_eq!(read("run-0000"), read("run-0001"));

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_config_fails() {
    let config_contents = CONFIG.replace("n_rows = 24", "n_rows = 0");
    let test_dir = setup_dir("invalid_config_fails", &config_contents);

    let output = exec_bin(&test_dir, &["create"]);
    assert!(!output.status.success());
    assert!(!test_dir.join("run-0000").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn resume_without_checkpoint_fails() {
    let test_dir = setup_dir("resume_without_checkpoint_fails", CONFIG);

    let output = exec_bin(&test_dir, &["resume", "--run-idx", "0"]);
    assert!(!output.status.success());

    fs::remove_dir_all(&test_dir).ok();
}
