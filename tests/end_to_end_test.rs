use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn run_command(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_deckhand"))
        .current_dir(cwd)
        .env("DECKHAND_HOME", cwd)
        .args(args)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_build_command() {
    // Create a project with one deck and a project file
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::write(root.join("intro.md"), "# Hello").expect("Failed to write deck");
    fs::write(root.join("config.json"), r#"{ "outDir": "dist" }"#).unwrap();

    let output = run_command(root, &[".", "--build", "--all", "--no-open", "--port", "0"]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let built = fs::read_to_string(root.join("dist/intro.html")).expect("Missing built deck");
    assert!(built.contains("# Hello"), "Missing document body");
    assert!(root.join("dist/index.html").is_file(), "Missing collection page");
}

#[test]
fn test_build_single_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("talks")).unwrap();
    fs::write(root.join("talks/intro.md"), "# Hello").unwrap();
    fs::write(root.join("talks/other.md"), "# Other").unwrap();

    let output = run_command(root, &["talks/intro.md", "-b", "--no-open", "--port", "0"]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    // The target directory is the file's directory, so output lands under it.
    assert!(root.join("talks/_site/intro.html").is_file());
    assert!(!root.join("talks/_site/other.html").exists());
}

#[test]
fn test_no_presentations_found() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let output = run_command(temp_dir.path(), &[".", "--build", "--no-open", "--port", "0"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let output = run_command(temp_dir.path(), &["--init"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(temp_dir.path().join("config.json").is_file());
    assert!(temp_dir.path().join("src/intro.md").is_file());

    // The scaffolded project builds.
    let output = run_command(temp_dir.path(), &[".", "--build", "--no-open", "--port", "0"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(temp_dir.path().join("dist/slides/intro.html").is_file());
}

#[test]
fn test_version_flag() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let output = run_command(temp_dir.path(), &["-v"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[cfg(unix)]
#[test]
fn test_interrupt_shuts_the_server_down() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("intro.md"), "# Hello").unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_deckhand"))
        .current_dir(temp_dir.path())
        .env("DECKHAND_HOME", temp_dir.path())
        .env("RUST_LOG", "info")
        .args([".", "--no-open", "--port", "0"])
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start server");

    // Wait until the interrupt handler is installed.
    let mut lines = BufReader::new(child.stderr.take().unwrap()).lines();
    let ready = lines
        .by_ref()
        .map_while(|line| line.ok())
        .any(|line| line.contains("Press Ctrl-C to stop"));
    assert!(ready, "Server never became ready");

    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("Failed to send SIGINT");
    assert!(status.success());

    let rest = thread::spawn(move || lines.map_while(|line| line.ok()).collect::<Vec<_>>());
    let deadline = Instant::now() + Duration::from_secs(10);
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("Server did not stop after SIGINT");
        }
        thread::sleep(Duration::from_millis(50));
    };
    assert!(exit.success(), "Unexpected exit: {:?}", exit);
    let rest = rest.join().unwrap();
    assert!(rest.iter().any(|line| line.contains("Shutting down server...")));
}
