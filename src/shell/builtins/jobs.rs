use std::io::Write;

use log::debug;

use crate::{
    errors::{Error, Result},
    shell::{
        builtins::{self, BuiltinCommand},
        Shell,
    },
};

#[derive(Debug)]
pub struct MyJobs;

impl BuiltinCommand for MyJobs {
    const NAME: &'static str = builtins::MYJOBS_NAME;

    const HELP: &'static str = "\
myjobs: usage: myjobs
    Display status of background jobs.

    Lists each background job that is still running, along with the
    command line that started it. Jobs that have finished are reaped
    first and not listed.

    Exit Status:
    Returns success unless an argument is given or an error occurs.";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        if !args.is_empty() {
            return Err(Error::builtin_command(Self::usage(), 2));
        }

        debug!("{:?}", shell.job_table());
        shell.job_table_mut().list(stdout)
    }
}
