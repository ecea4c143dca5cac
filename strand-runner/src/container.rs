//! Container command execution
//!
//! Runs one tool invocation per call as a throwaway container:
//! - Building the runtime argv (volume, working directory, environment)
//! - Capturing stdout and stderr concurrently
//! - Enforcing the wall-clock timeout and killing the whole process tree
//!
//! Every failure mode is folded into the returned `CommandResult`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strand_core::domain::command::{CommandDescriptor, CommandResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;

/// How long stream readers may keep draining after the process tree is killed
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Executes tool invocations
///
/// Implementations must return exactly one result per call and never retry.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, command: CommandDescriptor) -> CommandResult;
}

/// Checks that the container runtime is installed and answers `--version`
pub async fn check_runtime_available(runtime: &str) -> Result<()> {
    let output = Command::new(runtime)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("Failed to execute '{} --version'. Is it installed?", runtime))?;

    if !output.status.success() {
        anyhow::bail!("Container runtime '{}' is not working correctly", runtime);
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Container runtime is available: {}", version.trim());

    Ok(())
}

/// Runs commands inside the configured toolkit image
pub struct ContainerExecutor {
    config: RunnerConfig,
}

impl ContainerExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Arguments passed to the runtime executable, in launch order
    pub fn container_args(&self, command: &CommandDescriptor) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            self.config.volume_mapping(),
            "-w".to_string(),
            self.config.working_dir.clone(),
        ];

        for (key, value) in command.environment() {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(self.config.image.clone());
        args.push(self.config.tool_wrapper.clone());
        args.push(command.command_line());

        args
    }

    fn spawn(&self, args: &[String]) -> std::io::Result<Child> {
        let mut process = std::process::Command::new(&self.config.runtime);
        process
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so a timeout can take down every descendant
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            process.process_group(0);
        }

        Command::from(process).kill_on_drop(true).spawn()
    }
}

#[async_trait]
impl CommandRunner for ContainerExecutor {
    async fn execute(&self, command: CommandDescriptor) -> CommandResult {
        let started = Instant::now();
        let args = self.container_args(&command);

        info!("Executing {}: {}", command.tool_name, command.command_line());
        debug!("{} {}", self.config.runtime, args.join(" "));

        let mut child = match self.spawn(&args) {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn '{}': {}", self.config.runtime, e);
                return CommandResult::transport_failure(
                    command,
                    e,
                    String::new(),
                    String::new(),
                    started.elapsed(),
                );
            }
        };

        // Captured up front: once the child is reaped `id()` returns None,
        // but its group may still hold descendants
        let process_group = child.id();
        let mut stdout = StreamCapture::start("stdout", child.stdout.take());
        let mut stderr = StreamCapture::start("stderr", child.stderr.take());

        let limit = self.config.command_timeout;
        let finished = tokio::time::timeout(limit, async {
            let status = child.wait().await?;
            let (out, err) = tokio::join!(stdout.finish(), stderr.finish());
            out?;
            err?;
            Ok::<_, std::io::Error>(status)
        })
        .await;

        match finished {
            Ok(Ok(status)) => {
                let result = CommandResult::completed(
                    command,
                    status.code(),
                    stdout.snapshot(),
                    stderr.snapshot(),
                    started.elapsed(),
                );
                if result.success {
                    debug!(
                        "{} exited cleanly after {:?} (stdout_len={}, stderr_len={})",
                        result.command.tool_name,
                        result.elapsed,
                        result.stdout.len(),
                        result.stderr.len()
                    );
                } else {
                    warn!(
                        "{} exited with {:?}: {}",
                        result.command.tool_name,
                        result.exit_code,
                        result.error_text()
                    );
                }
                result
            }
            Ok(Err(e)) => {
                error!("I/O failure while running {}: {}", command.tool_name, e);
                terminate(&mut child, process_group).await;
                stdout.settle().await;
                stderr.settle().await;
                CommandResult::transport_failure(
                    command,
                    e,
                    stdout.snapshot(),
                    stderr.snapshot(),
                    started.elapsed(),
                )
            }
            Err(_) => {
                error!(
                    "{} exceeded the {:?} limit, killing process tree",
                    command.tool_name, limit
                );
                terminate(&mut child, process_group).await;
                stdout.settle().await;
                stderr.settle().await;
                CommandResult::timed_out(
                    command,
                    limit,
                    stdout.snapshot(),
                    stderr.snapshot(),
                    started.elapsed(),
                )
            }
        }
    }
}

/// Kills the child's process group and reaps the child
async fn terminate(child: &mut Child, process_group: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pgid) = process_group {
            if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                debug!("killpg({}) failed: {}", pgid, e);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = process_group;

    if let Err(e) = child.start_kill() {
        debug!("Child already gone: {}", e);
    }

    match child.wait().await {
        Ok(status) => debug!("Killed process reaped with {}", status),
        Err(e) => warn!("Failed to reap killed process: {}", e),
    }
}

/// Accumulates one output stream in the background
///
/// The buffer is shared so partial output survives a timeout.
struct StreamCapture {
    buffer: Arc<Mutex<String>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl StreamCapture {
    fn start<R>(name: &'static str, stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(String::new()));
        let task = stream.map(|stream| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut line = Vec::new();
                loop {
                    line.clear();
                    if reader.read_until(b'\n', &mut line).await? == 0 {
                        return Ok(());
                    }
                    let text = String::from_utf8_lossy(&line);
                    debug!("[{}] {}", name, text.trim_end());
                    buffer
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push_str(&text);
                }
            })
        });

        Self { buffer, task }
    }

    /// Waits for the stream to reach end of file
    async fn finish(&mut self) -> std::io::Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let joined = task.await;
        self.task = None;
        joined.map_err(std::io::Error::other)?
    }

    /// Gives the reader a short grace period after a kill, then abandons it
    async fn settle(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if tokio::time::timeout(KILL_GRACE, &mut *task).await.is_err() {
                task.abort();
            }
        }
        self.task = None;
    }

    fn snapshot(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::domain::command::{CommandParameter, FailureKind};
    use tempfile::TempDir;

    fn descriptor() -> CommandDescriptor {
        CommandDescriptor::builder("HaplotypeCaller")
            .reference("/data/ref.fasta")
            .input("/data/S001.bam")
            .output("/data/out/S001.raw.vcf")
            .parameter(CommandParameter::env("JAVA_OPTS", "-Xmx4g"))
            .parameter(CommandParameter::option("--pcr-indel-model", "NONE"))
            .parameter(CommandParameter::env("TMPDIR", "/data/tmp"))
            .build()
    }

    /// Writes an executable shell script standing in for the container runtime
    #[cfg(unix)]
    fn fake_runtime(dir: &TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-runtime");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn executor(runtime: String, timeout: Duration) -> ContainerExecutor {
        let mut config = RunnerConfig::default();
        config.runtime = runtime;
        config.command_timeout = timeout;
        ContainerExecutor::new(config)
    }

    #[test]
    fn test_container_args_order() {
        let mut config = RunnerConfig::new("broadinstitute/gatk:4.5.0.0".to_string());
        config.host_volume = "/srv/genomics".to_string();
        config.container_volume = "/data".to_string();
        config.working_dir = "/data/work".to_string();
        let executor = ContainerExecutor::new(config);

        let args = executor.container_args(&descriptor());
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "-v",
                "/srv/genomics:/data",
                "-w",
                "/data/work",
                "-e",
                "JAVA_OPTS=-Xmx4g",
                "-e",
                "TMPDIR=/data/tmp",
                "broadinstitute/gatk:4.5.0.0",
                "gatk",
                "HaplotypeCaller -R /data/ref.fasta -I /data/S001.bam \
                 -O /data/out/S001.raw.vcf --pcr-indel-model NONE",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_invocation_captures_output() {
        let dir = TempDir::new().unwrap();
        let runtime = fake_runtime(
            &dir,
            r#"echo "argc=$#"
for arg in "$@"; do echo "arg:$arg"; done
echo "progress meter" >&2
exit 0"#,
        );

        let result = executor(runtime, Duration::from_secs(10))
            .execute(descriptor())
            .await;

        assert!(result.success, "unexpected failure: {:?}", result.error_message);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("argc=13"));
        assert!(result.stdout.contains("arg:--rm"));
        assert!(result.stdout.contains("arg:JAVA_OPTS=-Xmx4g"));
        assert!(
            result
                .stdout
                .contains("arg:HaplotypeCaller -R /data/ref.fasta -I /data/S001.bam")
        );
        assert_eq!(result.stderr, "progress meter\n");
        assert_eq!(result.command, descriptor());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_stage_failure() {
        let dir = TempDir::new().unwrap();
        let runtime = fake_runtime(
            &dir,
            r#"echo "partial output"
echo "A USER ERROR has occurred: Input files reference and reads have incompatible contigs" >&2
exit 3"#,
        );

        let result = executor(runtime, Duration::from_secs(10))
            .execute(descriptor())
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.failure, Some(FailureKind::Stage));
        assert!(result.error_text().contains("incompatible contigs"));
        assert_eq!(result.stdout, "partial output\n");
    }

    #[tokio::test]
    async fn test_missing_runtime_is_transport_failure() {
        let result = executor(
            "/nonexistent/strand-container-runtime".to_string(),
            Duration::from_secs(10),
        )
        .execute(descriptor())
        .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, None);
        assert_eq!(result.failure, Some(FailureKind::Transport));
        assert!(result.error_text().starts_with("Error executing command:"));
    }

    #[cfg(target_os = "linux")]
    fn is_alive(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            // Zombies have already been killed, they only await reaping
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.trim_start().chars().next())
                .is_some_and(|state| state != 'Z'),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_process_tree() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let runtime = fake_runtime(
            &dir,
            &format!(
                r#"echo "started"
sleep 300 &
echo $! > "{}"
wait"#,
                pid_file.display()
            ),
        );

        let result = executor(runtime, Duration::from_secs(1))
            .execute(descriptor())
            .await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Timeout));
        assert!(result.error_text().contains("timed out"));
        assert_eq!(result.stdout, "started\n");
        assert!(result.elapsed < Duration::from_secs(10));

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut alive = is_alive(pid);
        for _ in 0..50 {
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            alive = is_alive(pid);
        }
        assert!(!alive, "background process {} survived the timeout", pid);
    }
}
