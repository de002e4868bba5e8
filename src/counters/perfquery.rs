//! Runs `perfquery` for the port behind an interface.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{parse, CounterSnapshot, CounterSource};
use crate::discovery::address;
use crate::error::QueryError;
use crate::sysfs::Sysfs;
use crate::types::PortLocator;

pub(crate) const DEFAULT_PROGRAM: &str = "perfquery";
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub(crate) struct PerfqueryOptions {
    /// Command line prefix, e.g. `perfquery` or `sudo -n perfquery`.
    pub(crate) program: String,
    pub(crate) timeout: Duration,
    /// Pass `-r`; counters then restart from zero after every read.
    pub(crate) reset_after_read: bool,
    /// Pass `-x` for the 64-bit extended counters.
    pub(crate) extended: bool,
}

impl Default for PerfqueryOptions {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            timeout: DEFAULT_TIMEOUT,
            reset_after_read: false,
            extended: false,
        }
    }
}

/// Counter source backed by the `perfquery` diagnostic tool.
#[derive(Debug, Clone)]
pub(crate) struct Perfquery {
    sysfs: Sysfs,
    options: PerfqueryOptions,
}

impl Perfquery {
    pub(crate) fn new(sysfs: Sysfs, options: PerfqueryOptions) -> Self {
        Self { sysfs, options }
    }

    fn args(&self, port: &PortLocator) -> Vec<String> {
        let mut args: Vec<String> = self
            .options
            .program
            .split_whitespace()
            .skip(1)
            .map(str::to_string)
            .collect();
        if self.options.extended {
            args.push("-x".to_string());
        }
        if self.options.reset_after_read {
            args.push("-r".to_string());
        }
        args.extend([
            "-C".to_string(),
            port.device.clone(),
            "-P".to_string(),
            port.port_number.to_string(),
        ]);
        args
    }

    /// Runs perfquery against an already resolved port.
    pub(crate) fn query_port(&self, port: &PortLocator) -> Result<CounterSnapshot, QueryError> {
        let program = self
            .options
            .program
            .split_whitespace()
            .next()
            .unwrap_or(DEFAULT_PROGRAM);
        let args = self.args(port);
        let command = format!("{program} {}", args.join(" "));
        debug!(%command, "running perfquery");

        let output = run_with_timeout(program, &args, self.options.timeout)
            .map_err(|failure| failure.into_query_error(command.clone(), self.options.timeout))?;

        if !output.status.success() {
            warn!(%command, status = %output.status, "perfquery failed");
            return Err(QueryError::ExitStatus {
                command,
                code: output.status.code(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let snapshot = parse::parse_output(&output.stdout);
        if snapshot.is_empty() {
            return Err(QueryError::Unparseable { command });
        }

        debug!(%command, counters = snapshot.len(), "parsed perfquery output");
        Ok(snapshot)
    }
}

impl CounterSource for Perfquery {
    fn query(&self, interface: &str) -> Result<CounterSnapshot, QueryError> {
        let port =
            address::resolve(&self.sysfs, interface).ok_or_else(|| QueryError::Unresolved {
                interface: interface.to_string(),
            })?;
        self.query_port(&port)
    }
}

struct CapturedOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

enum RunFailure {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut,
}

impl RunFailure {
    fn into_query_error(self, command: String, timeout: Duration) -> QueryError {
        match self {
            RunFailure::Spawn(err) | RunFailure::Wait(err) => QueryError::Spawn {
                command,
                reason: err.to_string(),
            },
            RunFailure::TimedOut => QueryError::Timeout { command, timeout },
        }
    }
}

/// Runs `program` and collects its output, killing it once `timeout` passes.
///
/// The deadline also covers reading the pipes, which stay open while any
/// process the child left behind still holds them.
fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CapturedOutput, RunFailure> {
    let deadline = Instant::now() + timeout;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(RunFailure::Spawn)?;

    // Drain both pipes concurrently so a chatty child never blocks on write.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = wait_until(&mut child, deadline)?;

    Ok(CapturedOutput {
        status,
        stdout: collect(&stdout, deadline)?,
        stderr: collect(&stderr, deadline)?,
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn collect(rx: &Receiver<String>, deadline: Instant) -> Result<String, RunFailure> {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Ok(text),
        Err(RecvTimeoutError::Timeout) => Err(RunFailure::TimedOut),
        Err(RecvTimeoutError::Disconnected) => Ok(String::new()),
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> Result<ExitStatus, RunFailure> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                reap(child);
                return Err(RunFailure::TimedOut);
            }
            Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
            Err(err) => {
                reap(child);
                return Err(RunFailure::Wait(err));
            }
        }
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    use crate::discovery::testing::FakeSysfs;

    /// A stand-in perfquery run through `sh`, so the file is never exec'd
    /// directly while another test thread may still hold it open.
    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("perfquery.sh");
        fs::write(&path, format!("{body}\n")).unwrap();
        format!("sh {}", path.display())
    }

    fn options(program: String) -> PerfqueryOptions {
        PerfqueryOptions {
            program,
            timeout: Duration::from_secs(5),
            ..PerfqueryOptions::default()
        }
    }

    fn port() -> PortLocator {
        PortLocator {
            device: "mlx5_0".to_string(),
            port_number: 1,
        }
    }

    #[test]
    fn test_args_default_are_reset_free() {
        let pq = Perfquery::new(Sysfs::new("/nonexistent"), PerfqueryOptions::default());
        assert_eq!(pq.args(&port()), vec!["-C", "mlx5_0", "-P", "1"]);
    }

    #[test]
    fn test_args_keep_wrapper_prefix() {
        let pq = Perfquery::new(
            Sysfs::new("/nonexistent"),
            options("sudo -n perfquery".to_string()),
        );
        assert_eq!(
            pq.args(&port()),
            vec!["-n", "perfquery", "-C", "mlx5_0", "-P", "1"]
        );
    }

    #[test]
    fn test_args_extended_and_reset() {
        let pq = Perfquery::new(
            Sysfs::new("/nonexistent"),
            PerfqueryOptions {
                reset_after_read: true,
                extended: true,
                ..PerfqueryOptions::default()
            },
        );
        assert_eq!(pq.args(&port()), vec!["-x", "-r", "-C", "mlx5_0", "-P", "1"]);
    }

    #[test]
    fn test_query_port_parses_output() {
        let tmp = TempDir::new().unwrap();
        let program = script(
            tmp.path(),
            "echo \"# Port counters: Lid 1 port $4\"\necho 'XmtData:.........123'\necho 'RcvData:.........25'\necho 'LinkDownedCounter:...1'",
        );
        let pq = Perfquery::new(Sysfs::new(tmp.path()), options(program));

        let snapshot = pq.query_port(&port()).unwrap();
        assert_eq!(snapshot.get("XmtData"), Some(492));
        assert_eq!(snapshot.get("RcvData"), Some(100));
        assert_eq!(snapshot.get("LinkDownedCounter"), Some(1));
    }

    #[test]
    fn test_query_port_nonzero_exit() {
        let tmp = TempDir::new().unwrap();
        let program = script(tmp.path(), "echo 'ibwarn: mad_rpc failed' >&2\nexit 3");
        let pq = Perfquery::new(Sysfs::new(tmp.path()), options(program));

        assert!(matches!(
            pq.query_port(&port()),
            Err(QueryError::ExitStatus { code: Some(3), ref stderr, .. }) if stderr == "ibwarn: mad_rpc failed"
        ));
    }

    #[test]
    fn test_query_port_unparseable() {
        let tmp = TempDir::new().unwrap();
        let program = script(tmp.path(), "echo 'nothing useful here'");
        let pq = Perfquery::new(Sysfs::new(tmp.path()), options(program));

        assert!(matches!(
            pq.query_port(&port()),
            Err(QueryError::Unparseable { .. })
        ));
    }

    #[test]
    fn test_query_port_missing_binary() {
        let pq = Perfquery::new(
            Sysfs::new("/nonexistent"),
            options("/nonexistent/perfquery".to_string()),
        );
        assert!(matches!(
            pq.query_port(&port()),
            Err(QueryError::Spawn { .. })
        ));
    }

    #[test]
    fn test_query_port_timeout() {
        let tmp = TempDir::new().unwrap();
        let program = script(tmp.path(), "exec sleep 10");
        let pq = Perfquery::new(
            Sysfs::new(tmp.path()),
            PerfqueryOptions {
                program,
                timeout: Duration::from_millis(200),
                ..PerfqueryOptions::default()
            },
        );

        let started = Instant::now();
        assert!(matches!(
            pq.query_port(&port()),
            Err(QueryError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_query_port_timeout_covers_leftover_pipe_holders() {
        let tmp = TempDir::new().unwrap();
        let program = script(
            tmp.path(),
            "sleep 3 &\necho 'XmtData:....1'\necho 'RcvData:....1'\nexit 0",
        );
        let pq = Perfquery::new(
            Sysfs::new(tmp.path()),
            PerfqueryOptions {
                program,
                timeout: Duration::from_millis(200),
                ..PerfqueryOptions::default()
            },
        );

        let started = Instant::now();
        assert!(matches!(
            pq.query_port(&port()),
            Err(QueryError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_query_resolves_interface_first() {
        let fake = FakeSysfs::new();
        fake.ipoib(
            "ib0",
            "up",
            "mlx5_3",
            2,
            "fe80:0000:0000:0000:0002:c903:0029:7de1",
        );
        let tmp = TempDir::new().unwrap();
        let program = script(
            tmp.path(),
            "[ \"$2\" = mlx5_3 ] && [ \"$4\" = 2 ] || exit 1\necho 'XmtData:....1'\necho 'RcvData:....2'",
        );
        let pq = Perfquery::new(fake.sysfs(), options(program));

        let snapshot = pq.query("ib0").unwrap();
        assert_eq!(snapshot.get("XmtData"), Some(4));
        assert_eq!(snapshot.get("RcvData"), Some(8));

        assert_eq!(
            pq.query("ib5"),
            Err(QueryError::Unresolved {
                interface: "ib5".to_string()
            })
        );
    }
}
