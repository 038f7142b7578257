//! Scheduling priority for latency-sensitive deployments.
//!
//! All of this needs privileges (CAP_SYS_NICE, or root for
//! `oom_score_adj`). Failures come back as errors for the caller to log.

use edgeflow_core::Result;

use crate::config::PriorityConfig;

/// Apply the process-wide part of `config`. Thread priority is applied by each
/// stage worker.
pub fn apply(config: &PriorityConfig) -> Result<()> {
    if config.realtime_process {
        set_process_realtime()?;
    }
    Ok(())
}

/// Move the calling thread to SCHED_FIFO at the maximum priority.
#[cfg(unix)]
pub fn set_thread_realtime() -> Result<()> {
    let policy = libc::SCHED_FIFO;
    let max = unsafe { libc::sched_get_priority_max(policy) };
    if max < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let param = libc::sched_param {
        sched_priority: max,
    };
    let ret = unsafe { libc::pthread_setschedparam(libc::pthread_self(), policy, &param) };
    if ret != 0 {
        return Err(std::io::Error::from_raw_os_error(ret).into());
    }
    tracing::info!(priority = max, "thread set to SCHED_FIFO");
    Ok(())
}

#[cfg(not(unix))]
pub fn set_thread_realtime() -> Result<()> {
    Err(edgeflow_core::EdgeError::Config(
        "realtime threads are not supported on this platform".into(),
    ))
}

/// Protect the process from the OOM killer, renice it to -20 and switch it to
/// SCHED_RR at the maximum priority. Every step is attempted; the first
/// failure is returned.
#[cfg(target_os = "linux")]
pub fn set_process_realtime() -> Result<()> {
    let steps: [Step<'_>; 3] = [
        ("oom_score_adj", &oom_protect),
        ("renice", &renice),
        ("sched_rr", &round_robin),
    ];
    best_effort(steps)?;
    tracing::info!("process set to SCHED_RR, nice -20, oom_score_adj -1000");
    Ok(())
}

#[cfg(target_os = "linux")]
fn oom_protect() -> Result<()> {
    std::fs::write("/proc/self/oom_score_adj", "-1000")?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn renice() -> Result<()> {
    if unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -20) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn round_robin() -> Result<()> {
    let max = unsafe { libc::sched_get_priority_max(libc::SCHED_RR) };
    if max < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let param = libc::sched_param {
        sched_priority: max,
    };
    if unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(any(target_os = "linux", test))]
type Step<'a> = (&'a str, &'a dyn Fn() -> Result<()>);

/// Run every step, log each failure and keep the first one.
#[cfg(any(target_os = "linux", test))]
fn best_effort<'a>(steps: impl IntoIterator<Item = Step<'a>>) -> Result<()> {
    let mut first = None;
    for (name, step) in steps {
        if let Err(e) = step() {
            tracing::warn!(step = name, error = %e, "priority step failed");
            first.get_or_insert(e);
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_process_realtime() -> Result<()> {
    Err(edgeflow_core::EdgeError::Config(
        "realtime process scheduling is only supported on Linux".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_changes_nothing() {
        assert!(apply(&PriorityConfig::default()).is_ok());
    }

    #[test]
    fn later_steps_run_after_a_failure() {
        use std::cell::Cell;
        use edgeflow_core::EdgeError;

        let ran = Cell::new(0);
        let fail = || -> Result<()> {
            ran.set(ran.get() + 1);
            Err(EdgeError::Config("denied".into()))
        };
        let ok = || -> Result<()> {
            ran.set(ran.get() + 1);
            Ok(())
        };
        let other = || -> Result<()> { Err(EdgeError::Pipeline("second".into())) };

        let steps: [Step<'_>; 3] = [("first", &fail), ("second", &ok), ("third", &other)];
        let result = best_effort(steps);
        assert_eq!(ran.get(), 2);
        assert!(matches!(result, Err(EdgeError::Config(_))));

        let steps: [Step<'_>; 1] = [("only", &ok)];
        assert!(best_effort(steps).is_ok());
    }

    #[test]
    fn thread_priority_reports_instead_of_panicking() {
        // Usually fails without CAP_SYS_NICE; either way it must return.
        let handle = std::thread::spawn(|| set_thread_realtime().map_err(|e| e.to_string()));
        assert!(handle.join().is_ok());
    }
}
