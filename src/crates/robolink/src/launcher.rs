use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{LinkError, LinkResult};

/// Start the host process described by `config`.
///
/// The host may outlive the session. The session keeps the child only to
/// reap it once it exits.
pub(crate) fn launch_host(config: &SessionConfig) -> LinkResult<Child> {
    let executable = config.resolved_executable();
    let args = config.launch_args();
    info!(executable = %executable.display(), ?args, "launching host");

    let mut cmd = Command::new(&executable);
    cmd.args(&args);
    if let Some(dir) = &config.working_directory {
        cmd.current_dir(dir);
    }
    cmd.envs(&config.env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    cmd.spawn()
        .map_err(|err| LinkError::launch(format!("{}: {err}", executable.display())))
}

/// Poll the host's port at `retry_interval` until it accepts a connection
/// or `spawn_timeout` elapses. A host that exits during the wait fails fast.
pub(crate) fn wait_for_listener(config: &SessionConfig, child: &mut Child) -> LinkResult<()> {
    let address = config.address();
    let start = Instant::now();
    while start.elapsed() < config.spawn_timeout {
        if let Some(status) = child.try_wait()? {
            return Err(LinkError::launch(format!(
                "host exited during startup with {status}"
            )));
        }
        match TcpStream::connect(&address) {
            Ok(probe) => {
                drop(probe);
                debug!(%address, elapsed = ?start.elapsed(), "host is accepting connections");
                return Ok(());
            }
            Err(err) => debug!(%address, %err, "host not ready yet"),
        }
        thread::sleep(config.retry_interval);
    }
    Err(LinkError::StartupTimeout(config.spawn_timeout))
}
