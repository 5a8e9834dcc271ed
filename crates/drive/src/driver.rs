//! Driving rclone on remote hosts.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use cloudferry_shell_pool::{ChunkHandler, ExecOutput, RemoteShell};

use crate::progress::ProgressParser;
use crate::{conf, quote, DriveError, RemoteInfo};

/// Location of the tool config below `$HOME` on every host.
pub const CONFIG_REMOTE_PATH: &str = ".config/rclone/rclone.conf";

const INSTALL_SCRIPT_URL: &str = "https://rclone.org/install.sh";
const FALLBACK_ZIP_URL: &str = "https://downloads.rclone.org/rclone-current-linux-amd64.zip";

/// Callback invoked with `(percent, speed)` as a transfer progresses.
pub type ProgressHandler = Arc<dyn Fn(u8, Option<String>) + Send + Sync>;

/// Runs rclone single-file operations on hosts through a remote shell.
pub struct RcloneDriver {
    shell: Arc<dyn RemoteShell>,
    local_conf: PathBuf,
}

impl RcloneDriver {
    pub fn new(shell: Arc<dyn RemoteShell>, local_conf: PathBuf) -> Self {
        Self { shell, local_conf }
    }

    /// The operator-side config path: `$HOME/.config/rclone/rclone.conf`.
    pub fn default_conf_path() -> Option<PathBuf> {
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(CONFIG_REMOTE_PATH))
    }

    /// Uploads one file into the store, reporting parsed progress.
    ///
    /// Uses the single-file copy form so the target is a file, not a
    /// directory.
    pub async fn upload_file(
        &self,
        host_id: &str,
        local_path: &str,
        remote_name: &str,
        remote_path: &str,
        on_progress: ProgressHandler,
    ) -> Result<(), DriveError> {
        let cmd = format!(
            "rclone copyto {} {} --progress --stats 1s",
            quote(local_path)?,
            quote(&format!("{remote_name}:{remote_path}"))?,
        );
        debug!(host = %host_id, local = %local_path, "store upload");
        self.run_transfer(host_id, cmd, "copyto upload", on_progress)
            .await
    }

    /// Downloads one file from the store, reporting parsed progress.
    pub async fn download_file(
        &self,
        host_id: &str,
        remote_name: &str,
        remote_path: &str,
        local_path: &str,
        on_progress: ProgressHandler,
    ) -> Result<(), DriveError> {
        let cmd = format!(
            "rclone copyto {} {} --progress --stats 1s",
            quote(&format!("{remote_name}:{remote_path}"))?,
            quote(local_path)?,
        );
        debug!(host = %host_id, local = %local_path, "store download");
        self.run_transfer(host_id, cmd, "copyto download", on_progress)
            .await
    }

    async fn run_transfer(
        &self,
        host_id: &str,
        cmd: String,
        op: &str,
        on_progress: ProgressHandler,
    ) -> Result<(), DriveError> {
        let parser = ProgressParser::new();
        let on_chunk: ChunkHandler = Arc::new(move |chunk: &str| {
            if let Some((percent, speed)) = parser.parse_chunk(chunk) {
                on_progress(percent, speed);
            }
        });

        let output = self
            .shell
            .exec_streaming(host_id, &with_user_path(&cmd), on_chunk)
            .await?;
        expect_success(op, &output)
    }

    /// Removes one object from the store (single file, never recursive).
    pub async fn delete_file(
        &self,
        host_id: &str,
        remote_name: &str,
        remote_path: &str,
    ) -> Result<(), DriveError> {
        let cmd = format!(
            "rclone deletefile {}",
            quote(&format!("{remote_name}:{remote_path}"))?
        );
        let output = self.shell.exec(host_id, &with_user_path(&cmd)).await?;
        expect_success("deletefile", &output)
    }

    /// Enumerates remotes configured in the operator's local config.
    pub fn list_remotes(&self) -> Result<Vec<RemoteInfo>, DriveError> {
        let contents = std::fs::read_to_string(&self.local_conf)
            .map_err(|e| DriveError::Config(format!("{}: {e}", self.local_conf.display())))?;
        Ok(conf::parse_conf(&contents))
    }

    /// Enumerates remotes configured on a host.
    ///
    /// A host without a config file simply has no remotes.
    pub async fn list_server_remotes(&self, host_id: &str) -> Result<Vec<RemoteInfo>, DriveError> {
        let output = self
            .shell
            .exec(host_id, &format!("cat \"$HOME/{CONFIG_REMOTE_PATH}\""))
            .await?;
        if !output.success() {
            debug!(host = %host_id, "no tool config on host");
            return Ok(Vec::new());
        }
        Ok(conf::parse_conf(&output.stdout))
    }

    /// Checks whether the tool responds on a host.
    pub async fn check_installed(&self, host_id: &str) -> Result<bool, DriveError> {
        let output = self
            .shell
            .exec(host_id, &with_user_path("rclone version"))
            .await?;
        Ok(output.success())
    }

    /// Installs the tool on a host.
    ///
    /// Tries the distro install script under sudo first; when sudo is
    /// unavailable, falls back to a user-local extraction into `~/bin`
    /// and appends `~/bin` to the shell profile's PATH.
    pub async fn install_on_host(&self, host_id: &str) -> Result<(), DriveError> {
        info!(host = %host_id, "installing store tool");

        let sudo_cmd = format!("curl -fsSL {INSTALL_SCRIPT_URL} | sudo -n bash");
        let sudo = self.shell.exec(host_id, &sudo_cmd).await?;
        if !sudo.success() {
            warn!(host = %host_id, "sudo install failed, trying user-local install");

            let fallback = format!(
                "mkdir -p \"$HOME/bin\" && cd /tmp && \
                 curl -fsSL -o rclone.zip {FALLBACK_ZIP_URL} && \
                 unzip -o -j rclone.zip '*/rclone' -d \"$HOME/bin\" && \
                 chmod +x \"$HOME/bin/rclone\" && rm -f /tmp/rclone.zip"
            );
            let output = self.shell.exec(host_id, &fallback).await?;
            if !output.success() {
                return Err(DriveError::Install(error_text(&output)));
            }

            let path_line = "grep -qs 'HOME/bin' \"$HOME/.profile\" || \
                 printf '\\nexport PATH=\"$HOME/bin:$PATH\"\\n' >> \"$HOME/.profile\"";
            let _ = self.shell.exec(host_id, path_line).await?;
        }

        if !self.check_installed(host_id).await? {
            return Err(DriveError::Install(
                "tool still missing after install".into(),
            ));
        }
        info!(host = %host_id, "store tool ready");
        Ok(())
    }

    /// Copies the operator's local config onto a host.
    pub async fn deploy_config(&self, host_id: &str) -> Result<(), DriveError> {
        let home = self.shell.exec(host_id, "echo $HOME").await?;
        let home = home.stdout.lines().next().unwrap_or("").trim().to_string();
        if home.is_empty() {
            return Err(DriveError::Command {
                op: "deploy config".into(),
                message: "could not resolve $HOME on host".into(),
            });
        }

        let mkdir = self
            .shell
            .exec(host_id, "mkdir -p \"$HOME/.config/rclone\"")
            .await?;
        expect_success("deploy config", &mkdir)?;

        let remote = format!("{home}/{CONFIG_REMOTE_PATH}");
        self.shell
            .put_file(host_id, &self.local_conf, &remote)
            .await?;
        info!(host = %host_id, "tool config deployed");
        Ok(())
    }
}

/// Prefixes a command so user-local installs in `~/bin` resolve.
fn with_user_path(cmd: &str) -> String {
    format!("export PATH=\"$HOME/bin:$PATH\"; {cmd}")
}

fn expect_success(op: &str, output: &ExecOutput) -> Result<(), DriveError> {
    if output.success() {
        Ok(())
    } else {
        Err(DriveError::Command {
            op: op.to_string(),
            message: error_text(output),
        })
    }
}

fn error_text(output: &ExecOutput) -> String {
    if !output.stderr.is_empty() {
        output.stderr.clone()
    } else if !output.stdout.is_empty() {
        output.stdout.clone()
    } else {
        format!("exit code {}", output.exit_code)
    }
}
