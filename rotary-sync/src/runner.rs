//! Blocking process execution behind a trait so transfers can be tested
//! without spawning anything.

use std::io;
use std::process::Command;

/// Issues one external command and reports its exit code.
///
/// `Ok(None)` means the process ended without an exit code (killed by a
/// signal). `Err` means it could not be started.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<Option<i32>>;
}

/// Runs commands with `std::process::Command`, inheriting stdio and blocking
/// until the child exits.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<Option<i32>> {
        tracing::debug!(command = %command_line(program, args), "running");
        let status = Command::new(program).args(args).status()?;
        Ok(status.code())
    }
}

/// Logs commands instead of running them and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunner;

impl CommandRunner for DryRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<Option<i32>> {
        tracing::info!("[dry-run] {}", command_line(program, args));
        Ok(Some(0))
    }
}

/// Human-readable command line, escaped the same way `-e` values are.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = crate::escape(program);
    for arg in args {
        line.push(' ');
        line.push_str(&crate::escape(arg));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_quotes_arguments_with_spaces() {
        let args = vec!["-e".to_string(), "ssh -p 22".to_string()];
        assert_eq!(command_line("rsync", &args), "rsync -e 'ssh -p 22'");
    }

    #[test]
    fn dry_runner_reports_success() {
        assert_eq!(DryRunner.run("rm", &["-rf".into(), "/".into()]).unwrap(), Some(0));
    }

    #[test]
    #[cfg(unix)]
    fn system_runner_returns_exit_code() {
        let code = SystemRunner
            .run("sh", &["-c".into(), "exit 24".into()])
            .expect("spawn sh");
        assert_eq!(code, Some(24));
    }

    #[test]
    fn system_runner_reports_spawn_failure() {
        let err = SystemRunner
            .run("rotary-definitely-missing-binary", &[])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
