//! Companion binary lifecycle: install checks, self-update, invocation.
//!
//! The agent never talks to the Tempo service itself; every heartbeat goes
//! through `tempo-cli`, installed under `~/.tempo/tempo-cli/`. This module
//! keeps that binary present and current, and exposes the single `invoke`
//! chokepoint used for both heartbeats and version checks.
//!
//! Failure policy: nothing here may block the editor. A failed version check
//! counts as up to date, and a failed download is logged and skipped so the
//! agent still starts (heartbeats then fail later with a clear error).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DOWNLOAD_BASE_URL: &str = "https://tempo-cli.s3-us-west-2.amazonaws.com";

/// Heartbeat accepted by the Tempo service.
pub const EXIT_SUCCESS: i32 = 0;
/// Remote service rejected the request; details are in the companion log.
pub const EXIT_API_ERROR: i32 = 102;
/// The companion could not parse the shared config file.
pub const EXIT_CONFIG_PARSE_ERROR: i32 = 103;
/// The saved API key was rejected by the service.
pub const EXIT_INVALID_API_KEY: i32 = 104;

/// Default install location for companion resources (`~/.tempo`).
pub fn default_resources_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tempo")
}

/// Platform segment of the download URLs, e.g. `mac-x86-64` or `linux-arm64`.
fn platform_slug() -> String {
    let os = if cfg!(target_os = "macos") {
        "mac"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else {
        "linux"
    };
    let arch = if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "x86-64"
    };
    format!("{os}-{arch}")
}

/// Errors from the companion binary layer.
#[derive(Debug)]
pub enum CliError {
    /// Network/HTTP error while fetching a remote resource
    Network(String),
    /// The companion binary could not be spawned
    Spawn(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Network(e) => write!(f, "network error: {e}"),
            CliError::Spawn(e) => write!(f, "spawn error: {e}"),
        }
    }
}

impl std::error::Error for CliError {}

/// Captured output of one companion invocation.
#[derive(Debug, Clone)]
pub struct CliOutput {
    /// Stdout, split into lines
    pub stdout: Vec<String>,
    /// Stderr, split into lines
    pub stderr: Vec<String>,
    /// Raw exit code, `-1` when the process died without one
    pub exit_code: i32,
}

impl CliOutput {
    /// Check whether the invocation reported success.
    pub fn success(&self) -> bool {
        self.exit_code == EXIT_SUCCESS
    }
}

/// Manager for the `tempo-cli` companion binary.
#[derive(Debug, Clone)]
pub struct CliTool {
    resources_dir: PathBuf,
    base_url: String,
    client: reqwest::Client,
}

impl CliTool {
    /// Create a manager using the default install location.
    pub fn new() -> Self {
        Self::with_resources_dir(default_resources_dir())
    }

    /// Create a manager with a custom resources directory.
    pub fn with_resources_dir(resources_dir: PathBuf) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            resources_dir,
            base_url: DOWNLOAD_BASE_URL.to_string(),
            client,
        }
    }

    /// Full path of the installed companion binary.
    pub fn cli_path(&self) -> PathBuf {
        let name = if cfg!(windows) {
            "tempo-cli.exe"
        } else {
            "tempo-cli"
        };
        self.resources_dir.join("tempo-cli").join(name)
    }

    /// Check that the companion binary exists and is executable.
    pub fn is_installed(&self) -> bool {
        is_executable(&self.cli_path())
    }

    /// Fetch the latest published companion version.
    pub async fn latest_version(&self) -> Result<String, CliError> {
        let url = format!("{}/{}/current_version.txt", self.base_url, platform_slug());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CliError::Network(e.to_string()))?;
        let text = response
            .text()
            .await
            .map_err(|e| CliError::Network(e.to_string()))?;
        Ok(text.trim().to_string())
    }

    /// Ask the installed companion for its version via `--version`.
    pub async fn installed_version(&self) -> Result<String, CliError> {
        let output = self.invoke(&["--version".to_string()]).await?;
        if !output.stderr.is_empty() {
            tracing::error!(
                "Failed to check local tempo-cli version: {}",
                output.stderr.join("\n")
            );
        }
        Ok(output.stdout.join("\n").trim().to_string())
    }

    /// Check whether the installed companion matches the latest published
    /// version. Versions are compared as exact strings.
    ///
    /// Fails open: when the network fetch or the local spawn fails the
    /// companion is treated as up to date, so connectivity problems never
    /// hold up editor startup.
    pub async fn is_up_to_date(&self) -> bool {
        if !self.is_installed() {
            return false;
        }

        let latest = match self.latest_version().await {
            Ok(version) => version,
            Err(e) => {
                tracing::error!("Version check failed, assuming up to date: {e}");
                return true;
            }
        };
        let local = match self.installed_version().await {
            Ok(version) => version,
            Err(e) => {
                tracing::error!("Local version check failed, assuming up to date: {e}");
                return true;
            }
        };

        if local != latest {
            tracing::debug!("Found new tempo-cli version: {latest}");
        }
        local == latest
    }

    /// Make sure the companion is installed and current, downloading it when
    /// needed. Always returns; a failed download only means heartbeats will
    /// fail later with a clear error.
    pub async fn ensure_up_to_date(&self) {
        if self.is_up_to_date().await {
            return;
        }
        self.download().await;
    }

    /// Download and extract the companion archive for this platform.
    ///
    /// Every step logs its own failure and falls through so the startup
    /// chain keeps moving.
    pub async fn download(&self) {
        let url = format!("{}/{}/tempo-cli.zip", self.base_url, platform_slug());
        tracing::debug!("Downloading tempo-cli from {url}");

        if let Err(e) = tokio::fs::create_dir_all(&self.resources_dir).await {
            tracing::error!("Could not create {:?}: {e}", self.resources_dir);
            return;
        }

        let bytes = match self.fetch_archive(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to download tempo-cli: {e}");
                return;
            }
        };

        let archive = self.resources_dir.join("tempo-cli.zip");
        if let Err(e) = tokio::fs::write(&archive, &bytes).await {
            tracing::error!("Could not write {:?}: {e}", archive);
            return;
        }

        self.extract(&archive).await;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            tracing::warn!("Could not remove {:?}: {e}", archive);
        }
    }

    async fn fetch_archive(&self, url: &str) -> Result<Vec<u8>, CliError> {
        // Archives are bigger than the client's default budget allows.
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|e| CliError::Network(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CliError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Extract the archive next to itself using the platform archive tool.
    async fn extract(&self, archive: &Path) {
        let output = match unzip_command(archive, &self.resources_dir).output().await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Failed to run archive tool: {e}");
                return;
            }
        };

        if !output.status.success() || !output.stderr.is_empty() {
            tracing::error!(
                "Failed to extract tempo-cli.zip: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }

    /// Spawn the companion with the given arguments and collect its output.
    ///
    /// This is the single path through which every heartbeat and version
    /// check runs. The exit code is surfaced unmodified; interpretation is
    /// the caller's job.
    pub async fn invoke(&self, args: &[String]) -> Result<CliOutput, CliError> {
        let output = Command::new(self.cli_path())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CliError::Spawn(format!("{:?}: {e}", self.cli_path())))?;

        Ok(CliOutput {
            stdout: split_lines(&output.stdout),
            stderr: split_lines(&output.stderr),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

impl Default for CliTool {
    fn default() -> Self {
        Self::new()
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}

fn unzip_command(archive: &Path, into: &Path) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("powershell");
        cmd.arg("-NoProfile").arg("-Command").arg(format!(
            "Expand-Archive -Force -Path '{}' -DestinationPath '{}'",
            archive.display(),
            into.display()
        ));
        cmd
    } else {
        let mut cmd = Command::new("/usr/bin/unzip");
        cmd.arg("-o").arg(archive).arg("-d").arg(into);
        cmd
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_slug_shape() {
        let slug = platform_slug();
        let (os, arch) = slug.split_once('-').expect("slug has an os segment");
        assert!(matches!(os, "mac" | "linux" | "windows"));
        assert!(arch == "x86-64" || arch == "arm64");
    }

    #[test]
    fn test_cli_path_layout() {
        let tool = CliTool::with_resources_dir(PathBuf::from("/home/dev/.tempo"));
        let path = tool.cli_path();
        assert!(path.starts_with("/home/dev/.tempo/tempo-cli"));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("tempo-cli"));
    }

    #[test]
    fn test_not_installed_in_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CliTool::with_resources_dir(dir.path().to_path_buf());
        assert!(!tool.is_installed());
    }

    #[cfg(unix)]
    fn install_fake_cli(tool: &CliTool, script: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = tool.cli_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_installed_once_executable_exists() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CliTool::with_resources_dir(dir.path().to_path_buf());

        install_fake_cli(&tool, "#!/bin/sh\nexit 0\n");
        assert!(tool.is_installed());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_does_not_count_as_installed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = CliTool::with_resources_dir(dir.path().to_path_buf());
        let path = tool.cli_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not a binary").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(!tool.is_installed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CliTool::with_resources_dir(dir.path().to_path_buf());
        install_fake_cli(&tool, "#!/bin/sh\necho out1\necho out2\necho err 1>&2\nexit 104\n");

        let output = tool.invoke(&[]).await.unwrap();
        assert_eq!(output.stdout, vec!["out1", "out2"]);
        assert_eq!(output.stderr, vec!["err"]);
        assert_eq!(output.exit_code, EXIT_INVALID_API_KEY);
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_installed_version_trims_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CliTool::with_resources_dir(dir.path().to_path_buf());
        install_fake_cli(&tool, "#!/bin/sh\necho '  1.18.9  '\nexit 0\n");

        let version = tool.installed_version().await.unwrap();
        assert_eq!(version, "1.18.9");
    }

    #[tokio::test]
    async fn test_invoke_missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CliTool::with_resources_dir(dir.path().to_path_buf());

        let result = tool.invoke(&["--version".to_string()]).await;
        assert!(matches!(result, Err(CliError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_version_check_reports_not_up_to_date_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CliTool::with_resources_dir(dir.path().to_path_buf());

        // Not installed short-circuits before any network traffic.
        assert!(!tool.is_up_to_date().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_check_fails_open_on_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut tool = CliTool::with_resources_dir(dir.path().to_path_buf());
        // Nothing listens on the discard port, so the fetch fails fast.
        tool.base_url = "http://127.0.0.1:9".to_string();
        install_fake_cli(&tool, "#!/bin/sh\necho 1.0.0\nexit 0\n");

        assert!(tool.is_up_to_date().await);
    }
}
