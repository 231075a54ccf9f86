use std::fmt;
use std::io::Write;
use std::process::ExitStatus;

use failure::ResultExt;
use log::{debug, info, warn};
use nix::unistd::Pid;

use crate::{
    errors::{ErrorKind, Result},
    execute_command,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JobState {
    Running,
    Completed(ExitStatus),
}

/// The shell's record of one background process.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    id: Pid,
    origin: String,
    state: JobState,
}

impl Job {
    fn new(id: Pid, origin: &str) -> Self {
        Self {
            id,
            origin: origin.to_string(),
            state: JobState::Running,
        }
    }

    pub fn id(&self) -> Pid {
        self.id
    }

    /// The command line that started the job.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn mark_completed(self, status: ExitStatus) -> Self {
        Self {
            state: JobState::Completed(status),
            ..self
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            JobState::Running => write!(f, "PID: {}  Command: {}", self.id, self.origin),
            JobState::Completed(_) => write!(f, "PID: {}  Done  {}", self.id, self.origin),
        }
    }
}

/// Background jobs in the order they were started.
///
/// Only the shell's control loop touches the table. Entries leave the table
/// only once their process has been reaped, so a pid listed here can never
/// have been recycled by the kernel.
#[derive(Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records a freshly spawned background process.
    pub fn register(&mut self, id: Pid, origin: &str) {
        debug_assert!(
            !self.jobs.iter().any(|job| job.id() == id),
            "pid {} registered twice",
            id
        );
        info!("registering background job {}: {}", id, origin);
        self.jobs.push(Job::new(id, origin));
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Collects every job that has terminated, without blocking, and returns
    /// them in insertion order.
    pub fn reap(&mut self) -> Vec<Job> {
        let mut running = Vec::with_capacity(self.jobs.len());
        let mut completed = Vec::new();
        for job in self.jobs.drain(..) {
            match execute_command::try_wait(job.id()) {
                Ok(None) => running.push(job),
                Ok(Some(status)) => {
                    debug!("job {} exited with {}", job.id(), status);
                    completed.push(job.mark_completed(status));
                }
                Err(e) => {
                    // Nothing left to reap (e.g. ECHILD); keeping the entry
                    // would leave it Running forever.
                    warn!("dropping job {}: {}", job.id(), e);
                }
            }
        }

        self.jobs = running;
        completed
    }

    /// Writes one line per running job, after reaping finished ones.
    pub fn list(&mut self, stdout: &mut dyn Write) -> Result<()> {
        self.reap();
        for job in &self.jobs {
            writeln!(stdout, "{}", job).context(ErrorKind::Io)?;
        }

        Ok(())
    }
}

impl fmt::Debug for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} jobs", self.jobs.len())?;
        for job in &self.jobs {
            writeln!(f, "{:?}", job)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use nix::sys::signal::{self, Signal};

    use super::*;
    use crate::core::{
        plan::ExecutionPlan,
        tokenizer::{tokenize, DELIMITER},
    };
    use crate::execute_command::{launch, Launch, COMMAND_NOT_FOUND_EXIT_STATUS};
    use crate::util::MyshExitStatusExt;

    fn spawn_background(line: &str) -> Pid {
        let plan = ExecutionPlan::build(&tokenize(line, DELIMITER))
            .unwrap()
            .unwrap();
        match launch(&plan).unwrap() {
            Launch::Background(pid) => pid,
            other => panic!("expected background launch, got {:?}", other),
        }
    }

    /// Reaps until `table` is empty, giving up after a few seconds.
    fn reap_all(table: &mut JobTable) -> Vec<Job> {
        let mut completed = Vec::new();
        for _ in 0..500 {
            completed.extend(table.reap());
            if table.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        completed
    }

    fn listing(table: &mut JobTable) -> String {
        let mut stdout = Vec::new();
        table.list(&mut stdout).unwrap();
        String::from_utf8(stdout).unwrap()
    }

    #[test]
    fn test_empty_table_lists_nothing() {
        let mut table = JobTable::new();
        assert_eq!(listing(&mut table), "");
        assert!(table.reap().is_empty());
    }

    #[test]
    fn test_running_job_is_listed() {
        let mut table = JobTable::new();
        let pid = spawn_background("sleep 30 &");
        table.register(pid, "sleep 30 &");

        assert_eq!(
            listing(&mut table),
            format!("PID: {}  Command: sleep 30 &\n", pid)
        );
        assert_eq!(table.len(), 1);

        signal::kill(pid, Signal::SIGKILL).unwrap();
        let completed = reap_all(&mut table);
        assert!(table.is_empty());
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id(), pid);
        match completed[0].state() {
            JobState::Completed(status) => {
                assert_eq!(status.code(), Some(128 + Signal::SIGKILL as i32))
            }
            JobState::Running => panic!("reaped job should be completed"),
        }
    }

    #[test]
    fn test_missing_program_job_is_reaped() {
        let mut table = JobTable::new();
        let pid = spawn_background("mysh-test-no-such-program &");
        table.register(pid, "mysh-test-no-such-program &");

        let completed = reap_all(&mut table);
        assert!(table.is_empty());
        assert_eq!(listing(&mut table), "");
        assert_eq!(
            completed[0].state(),
            JobState::Completed(ExitStatus::from_status(COMMAND_NOT_FOUND_EXIT_STATUS))
        );
    }

    #[test]
    fn test_listing_keeps_insertion_order() {
        let mut table = JobTable::new();
        let first = spawn_background("sleep 30 &");
        let second = spawn_background("sleep 31 &");
        table.register(first, "sleep 30 &");
        table.register(second, "sleep 31 &");

        assert_eq!(
            listing(&mut table),
            format!(
                "PID: {}  Command: sleep 30 &\nPID: {}  Command: sleep 31 &\n",
                first, second
            )
        );

        signal::kill(first, Signal::SIGKILL).unwrap();
        signal::kill(second, Signal::SIGKILL).unwrap();
        reap_all(&mut table);
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_pid_is_dropped() {
        let mut table = JobTable::new();
        // Our own pid is never our child, so waitpid fails with ECHILD.
        table.register(Pid::this(), "not a child");
        assert!(table.reap().is_empty());
        assert!(table.is_empty());
    }
}
