//! The Shell drives each input line through tokenizing, planning and
//! launching, and owns the table of background jobs.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process::{self, ExitStatus};

use failure::ResultExt;
use log::{debug, info, warn};

use crate::{
    core::{
        job::JobTable,
        plan::ExecutionPlan,
        tokenizer::{self, DELIMITER},
    },
    errors::{Error, ErrorKind, Result},
    execute_command::{self, Launch},
    util::MyshExitStatusExt,
};

pub mod builtins;

const PROMPT: &str = "shell> ";

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Determines if the prompt is written before reading each line.
    show_prompt: bool,

    /// Determines if some messages (e.g. "exit", finished jobs) should be displayed.
    display_messages: bool,
}

impl ShellConfig {
    /// Creates an interactive shell: prompts and job notifications are shown.
    pub fn interactive() -> Self {
        Self {
            show_prompt: true,
            display_messages: true,
        }
    }

    /// Creates a noninteractive shell, e.g. for `-c` or script input.
    pub fn noninteractive() -> Self {
        Default::default()
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            show_prompt: false,
            display_messages: false,
        }
    }
}

#[derive(Debug)]
pub struct Shell {
    job_table: JobTable,
    /// Exit status of last command executed.
    last_exit_status: ExitStatus,
    config: ShellConfig,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        info!("mysh started up with {:?}", config);
        Self {
            job_table: JobTable::new(),
            last_exit_status: ExitStatus::from_success(),
            config,
        }
    }

    pub fn last_exit_status(&self) -> ExitStatus {
        self.last_exit_status
    }

    pub fn job_table(&self) -> &JobTable {
        &self.job_table
    }

    pub fn job_table_mut(&mut self) -> &mut JobTable {
        &mut self.job_table
    }

    /// Executes one line, writing builtin output to stdout.
    ///
    /// The returned error has already been recorded as the last exit status;
    /// the caller only has to report it.
    pub fn execute_command_string(&mut self, input: &str) -> Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        self.execute_command_string_to(input, &mut handle)
    }

    /// Like `execute_command_string`, but builtins write to `stdout`.
    pub fn execute_command_string_to(&mut self, input: &str, stdout: &mut dyn Write) -> Result<()> {
        let input = input.trim_end_matches(|c| c == '\n' || c == '\r');
        let result = self.execute_line(input, stdout);
        if let Err(ref e) = result {
            warn!("'{}' failed: {}", input, e);
            self.last_exit_status = ExitStatus::from_status(e.exit_code());
        }
        result
    }

    /// Executes each line of `path`, reporting failed lines and carrying on.
    pub fn execute_commands_from_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).context(ErrorKind::Io)?;
        for line in BufReader::new(file).lines() {
            let line = line.context(ErrorKind::Io)?;
            self.reap_jobs();
            report_error(self.execute_command_string(&line));
        }

        Ok(())
    }

    /// The read-eval loop. Returns at end of input.
    ///
    /// Lines are read through std's buffered stdin, so when input is piped a
    /// foreground child that reads its inherited stdin will not see lines the
    /// shell has already buffered.
    pub fn execute_from_stdin(&mut self) {
        let stdin = io::stdin();
        loop {
            // Background jobs are reaped here, between lines, and nowhere else
            // outside of `myjobs`.
            self.reap_jobs();

            if self.config.show_prompt {
                print!("{}", PROMPT);
                let temp_result = io::stdout().flush();
                log_if_err!(temp_result, "failed to flush prompt");
            }

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => break,
                Ok(_) => report_error(self.execute_command_string(&input)),
                Err(e) => {
                    warn!("failed to read line: {}", e);
                    break;
                }
            }
        }
    }

    pub fn exit(&mut self, n: Option<ExitStatus>) -> ! {
        if self.config.display_messages {
            println!("exit");
        }

        let code = match n {
            Some(n) => n.code().unwrap_or(1),
            None => self.last_exit_status.code().unwrap_or(1),
        };
        let code_like_u8 = if code < 0 {
            (256 + code) % 256
        } else {
            code % 256
        };

        info!(
            "mysh has shut down, leaving {} background jobs",
            self.job_table.len()
        );
        process::exit(code_like_u8);
    }

    fn execute_line(&mut self, input: &str, stdout: &mut dyn Write) -> Result<()> {
        let tokens = tokenizer::tokenize(input, DELIMITER);
        let plan = match ExecutionPlan::build(&tokens)? {
            Some(plan) => plan,
            None => return Ok(()),
        };

        if builtins::is_builtin(&plan.program) {
            return self.execute_builtin(&plan, stdout);
        }

        match execute_command::launch(&plan)? {
            Launch::Foreground(exit_status) => self.last_exit_status = exit_status,
            Launch::Background(pid) => {
                self.job_table.register(pid, input.trim());
                self.last_exit_status = ExitStatus::from_success();
            }
        }

        Ok(())
    }

    /// Builtins run inside the shell process: `&` is ignored and only an
    /// output redirection is honored.
    fn execute_builtin(&mut self, plan: &ExecutionPlan, stdout: &mut dyn Write) -> Result<()> {
        if plan.background {
            debug!("ignoring '&' for builtin {}", plan.program);
        }

        // Builtins never read stdin, but a bad input file still fails the line.
        if let Some(ref path) = plan.input_path {
            File::open(path).map_err(|e| Error::redirection_open_failed(path, e.to_string()))?;
        }

        let (exit_status, result) = match plan.output_path {
            Some(ref path) => {
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(0o644)
                    .open(path)
                    .map_err(|e| Error::redirection_open_failed(path, e.to_string()))?;
                builtins::run(self, &plan.program, &plan.arguments, &mut file)
            }
            None => builtins::run(self, &plan.program, &plan.arguments, stdout),
        };

        self.last_exit_status = exit_status;
        result
    }

    fn reap_jobs(&mut self) {
        for job in self.job_table.reap() {
            if self.config.display_messages {
                println!("{}", job);
            }
        }
    }
}

fn report_error(result: Result<()>) {
    if let Err(e) = result {
        eprintln!("mysh: {}", e);
    }
}
