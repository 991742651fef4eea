//! Forced process termination.

use runproc_common::{ProcessError, ProcessResult};
use tracing::debug;

/// Force kill a process (SIGKILL on Unix, TerminateProcess on Windows).
///
/// A process that has already disappeared is not an error. The caller must
/// still own the (unreaped) child so the PID cannot have been recycled.
pub fn force_kill(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                debug!(pid, "Process already gone before SIGKILL");
                Ok(())
            }
            Err(e) => Err(ProcessError::stop_failed(pid.to_string(), e.to_string())),
        }
    }

    #[cfg(windows)]
    {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

        unsafe {
            let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
                Ok(h) if !h.is_invalid() => h,
                _ => {
                    if !crate::process_exists(pid).unwrap_or(true) {
                        debug!(pid, "Process already gone before TerminateProcess");
                        return Ok(());
                    }
                    return Err(ProcessError::stop_failed(
                        pid.to_string(),
                        "Failed to open process for termination",
                    ));
                }
            };

            // The native code is irrelevant: hosts report killed children as 127.
            let result = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);

            result.map_err(|e| {
                ProcessError::stop_failed(pid.to_string(), format!("TerminateProcess failed: {}", e))
            })
        }
    }
}
