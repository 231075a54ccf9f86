use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use docopt::Docopt;
use log::{debug, error, LevelFilter};
use mysh::{MyshExitStatusExt, Result, Shell, ShellConfig};
use nix::unistd::Pid;
use serde_derive::Deserialize;

const LOG_FILE_NAME: &str = ".mysh_log";

const USAGE: &str = "
mysh.

Usage:
    mysh [options]
    mysh [options] -c <command>
    mysh [options] <file>
    mysh (-h | --help)
    mysh --version

Options:
    -h --help       Show this screen.
    --version       Show version.
    -c              If the -c option is present, then commands are read from the first non-option
                        argument command_string.
    --log=<path>    File to write log to, defaults to ~/.mysh_log
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    arg_file: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_log: Option<String>,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if let Err(e) = init_logger(&args.flag_log) {
        eprintln!("mysh: failed to initialize logging: {}", e);
    }
    debug!("{:?}", args);

    if args.flag_version {
        println!("mysh version {}", env!("CARGO_PKG_VERSION"));
    } else if args.flag_c || args.arg_file.is_some() {
        execute_from_command_string_or_file(&args);
    } else {
        execute_from_stdin();
    }
}

fn init_logger(path: &Option<String>) -> ::std::result::Result<(), fern::InitError> {
    let log_path = match path.clone().map(PathBuf::from).or_else(default_log_path) {
        Some(log_path) => log_path,
        None => return Ok(()),
    };

    let pid = Pid::this();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Trace)
        .chain(fern::log_file(log_path)?)
        .apply()?;
    Ok(())
}

fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_FILE_NAME))
}

fn execute_from_command_string_or_file(args: &Args) -> ! {
    let mut shell = Shell::new(ShellConfig::noninteractive());

    let result = if let Some(ref command) = args.arg_command {
        shell.execute_command_string(command)
    } else if let Some(ref file_path) = args.arg_file {
        shell.execute_commands_from_file(Path::new(file_path))
    } else {
        unreachable!();
    };

    exit(result, &mut shell);
}

fn execute_from_stdin() -> ! {
    let shell_config = if mysh::isatty() {
        ShellConfig::interactive()
    } else {
        ShellConfig::noninteractive()
    };
    let mut shell = Shell::new(shell_config);
    shell.execute_from_stdin();
    shell.exit(None)
}

fn exit(result: Result<()>, shell: &mut Shell) -> ! {
    if let Err(e) = result {
        error!("{}", e);
        eprintln!("mysh: {}", e);
        shell.exit(Some(ExitStatus::from_status(e.exit_code())));
    } else {
        shell.exit(None);
    }
}

