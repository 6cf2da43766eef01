//! Integration tests for the chartgate binary

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HELM_VARS: &[&str] = &[
    "HELM_REPO_CLIENT_ID",
    "HELM_REPO_CLIENT_SECRET",
    "HELM_REPO_CONTEXT_PATH",
    "HELM_REPO_USE_HTTP",
    "HELM_REPO_CA_FILE",
    "HELM_REPO_CERT_FILE",
    "HELM_REPO_KEY_FILE",
    "HELM_REPO_INSECURE",
    "HELM_DEBUG",
    "HELM_HOME",
    "TILLER_HOST",
    "RUST_LOG",
];

/// Isolated Helm environment: repository list, chart and fake `helm` binary
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let chart = dir.path().join("mychart");
        std::fs::create_dir_all(chart.join("templates")).unwrap();
        std::fs::write(
            chart.join("Chart.yaml"),
            "apiVersion: v2\nname: mychart\nversion: 0.1.0\n",
        )
        .unwrap();
        std::fs::write(chart.join("templates/cm.yaml"), "kind: ConfigMap\n").unwrap();
        Self { dir }
    }

    fn chart(&self) -> PathBuf {
        self.dir.path().join("mychart")
    }

    fn repositories(&self) -> PathBuf {
        self.dir.path().join("repositories.yaml")
    }

    fn write_repositories(&self, content: &str) {
        std::fs::write(self.repositories(), content).unwrap();
    }

    /// Command for the binary with a clean, sandboxed environment
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_chartgate"));
        cmd.args(args)
            .env("HELM_REPOSITORY_CONFIG", self.repositories())
            .env("HELM_BIN", self.dir.path().join("no-such-helm"))
            .current_dir(self.dir.path());
        for var in HELM_VARS {
            cmd.env_remove(var);
        }
        cmd
    }
}

/// Run the binary off the async runtime so mock servers keep answering
async fn run(mut cmd: Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output().expect("Failed to execute chartgate"))
        .await
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn cm_uri(server: &MockServer) -> String {
    server.uri().replacen("http://", "cm://", 1)
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

mod argument_handling {
    use super::*;

    #[test]
    fn test_wrong_argument_count() {
        let sandbox = Sandbox::new();
        for args in [vec![], vec!["only-chart"], vec!["a", "b", "c"]] {
            let output = sandbox.command(&args).output().unwrap();
            assert_eq!(output.status.code(), Some(1));
            assert!(stderr(&output).contains(
                "This command needs 2 arguments: name of chart, name of chart repository (or repo URL)"
            ));
        }
    }

    #[test]
    fn test_invalid_flags_exit_with_error_code() {
        let sandbox = Sandbox::new();
        for (args, message) in [
            (
                vec!["--bogus-flag", "chart", "repo"],
                "unexpected argument '--bogus-flag'",
            ),
            (vec!["chart", "repo", "--version"], "a value is required"),
        ] {
            let output = sandbox.command(&args).output().unwrap();
            assert_eq!(output.status.code(), Some(1));
            assert!(stderr(&output).contains(message), "stderr: {}", stderr(&output));
        }
    }

    #[test]
    fn test_help_succeeds() {
        let sandbox = Sandbox::new();
        let output = sandbox.command(&["--help"]).output().unwrap();
        assert!(output.status.success());
        assert!(stdout(&output).contains("--context-path"));
    }

    #[test]
    fn test_check_helm_version() {
        let sandbox = Sandbox::new();

        let output = sandbox.command(&["--check-helm-version"]).output().unwrap();
        assert!(output.status.success());
        assert_eq!(stdout(&output), "3\n");

        let output = sandbox
            .command(&["--check-helm-version"])
            .env("TILLER_HOST", "localhost:44134")
            .output()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(stdout(&output), "2\n");
    }

    #[test]
    fn test_unknown_repository_name() {
        let sandbox = Sandbox::new();
        sandbox.write_repositories("apiVersion: v1\nrepositories: []\n");

        let output = sandbox
            .command(&[path_arg(&sandbox.chart()), "museum"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));
        assert!(stderr(&output).contains(r#"no repo named "museum" found"#));
    }
}

mod push_command {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_with_env_credentials_and_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .and(header("CF-Access-Client-Id", "env-id"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "apiVersion: v1\nentries: {}\nserverInfo:\n  contextPath: /museum\n",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/museum/api/charts"))
            .and(header("CF-Access-Client-Id", "env-id"))
            .and(header("CF-Access-Client-Secret", "env-secret"))
            .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"saved":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let sandbox = Sandbox::new();
        let mut cmd = sandbox.command(&[path_arg(&sandbox.chart()), &server.uri()]);
        cmd.env("HELM_REPO_CLIENT_ID", "env-id")
            .env("HELM_REPO_CLIENT_SECRET", "env-secret");

        let output = run(cmd).await;
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(
            stdout(&output),
            format!("Pushing mychart-0.1.0.tgz to {}...\nDone.\n", server.uri())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_named_cm_repository_with_version_override() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/charts"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sandbox = Sandbox::new();
        sandbox.write_repositories(&format!(
            "apiVersion: v1\nrepositories:\n- name: museum\n  url: {}\n",
            cm_uri(&server)
        ));

        let mut cmd = sandbox.command(&[
            path_arg(&sandbox.chart()),
            "museum",
            "--version",
            "0.2.0-rc.1",
            "--context-path",
            "/",
        ]);
        cmd.env("HELM_REPO_USE_HTTP", "true");

        let output = run(cmd).await;
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(
            stdout(&output),
            "Pushing mychart-0.2.0-rc.1.tgz to museum...\nDone.\n"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_conflict_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string(r#"{"error":"conflict"}"#))
            .mount(&server)
            .await;

        let sandbox = Sandbox::new();
        let mut cmd = sandbox.command(&[path_arg(&sandbox.chart()), &server.uri()]);
        cmd.env("HELM_REPO_CONTEXT_PATH", "/");

        let output = run(cmd).await;
        assert_eq!(output.status.code(), Some(1));
        assert!(!stdout(&output).contains("Done."));
        let stderr = stderr(&output);
        assert!(stderr.contains("409"), "stderr: {}", stderr);
        assert!(stderr.contains("conflict"), "stderr: {}", stderr);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_unreachable_registry() {
        let sandbox = Sandbox::new();
        let mut cmd = sandbox.command(&[path_arg(&sandbox.chart()), "http://127.0.0.1:1"]);
        cmd.env("HELM_REPO_CONTEXT_PATH", "/");

        let output = run(cmd).await;
        assert_eq!(output.status.code(), Some(1));
    }
}

mod download_command {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_download_streams_archive_to_stdout() {
        let server = MockServer::start().await;
        let archive: Vec<u8> = vec![0x1f, 0x8b, 0x08, 0x00, 0x00, 0xff, 0x10, 0x80];
        Mock::given(method("GET"))
            .and(path("/org/charts/foo-1.0.0.tgz"))
            .and(header("CF-Access-Client-Id", "dl-id"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let sandbox = Sandbox::new();
        let url = format!("{}/org/charts/foo-1.0.0.tgz", cm_uri(&server));
        let mut cmd = sandbox.command(&["", "", "", &url]);
        cmd.env("HELM_REPO_USE_HTTP", "1")
            .env("HELM_REPO_CLIENT_ID", "dl-id")
            .env("HELM_DEBUG", "true");

        let output = run(cmd).await;
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(output.stdout, archive);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_download_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such chart"))
            .mount(&server)
            .await;

        let sandbox = Sandbox::new();
        let url = format!("{}/charts/foo-1.0.0.tgz", cm_uri(&server));
        let mut cmd = sandbox.command(&["cert", "key", "ca", &url]);
        cmd.env("HELM_REPO_USE_HTTP", "true");

        let output = run(cmd).await;
        assert_eq!(output.status.code(), Some(1));
        assert!(output.stdout.is_empty());
        assert!(stderr(&output).contains("could not properly parse response JSON: no such chart"));
    }

    #[test]
    fn test_invalid_file_url() {
        let sandbox = Sandbox::new();
        let output = sandbox
            .command(&["", "", "", "cm://charts.example.com"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));
        assert!(stderr(&output).contains("invalid file url: cm://charts.example.com"));
    }
}
