use log::debug;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

/// Starts `program` in its own session with no stdio attached, so it
/// outlives this process. Returns the child's pid.
pub fn spawn_detached(program: &str) -> io::Result<u32> {
    let mut command = Command::new(program);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid().map_err(io::Error::from)?;
            Ok(())
        });
    }

    debug!("Spawning {}", program);
    let child = command.spawn()?;
    Ok(child.id())
}

/// Runs `argv` to completion. A non-zero exit is turned into an error
/// carrying the command's stderr.
pub fn run_checked(argv: &[String]) -> Result<(), String> {
    let Some((program, args)) = argv.split_first() else {
        return Err("empty command".to_string());
    };

    debug!("Running {}", argv.join(" "));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| e.to_string())?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Err(format!("exited with {}", output.status))
    } else {
        Err(format!("exited with {}: {}", output.status, stderr))
    }
}
