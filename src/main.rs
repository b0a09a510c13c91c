use clap::Parser;
use rand::Rng;
use std::fs::File;
use std::io::{self, IsTerminal, Read, Seek};
use std::process::ExitCode;
use thiserror::Error;
use tracing::debug;
use zstdwriter::options::{WriterOptions, DEFAULT_COMPRESSION_LEVEL};
use zstdwriter::{FrameWriter, WriterError};

mod logging;

const PROG: &str = "zstdwriter";
/// Upper bound for one stdin read.  Each read picks a random size in
/// `1..=MAX_CHUNK` so the writer sees many write granularities.
const MAX_CHUNK: usize = 512 << 10;

#[derive(Parser)]
#[command(name = "zstdwriter", about = "Compress stdin into a single zstd frame on stdout")]
struct Cli {
    /// Compression level, given as -<digits> (default 3)
    #[arg(value_name = "-LEVEL", allow_hyphen_values = true)]
    level: Option<String>,
    /// Anything after the level is accepted and ignored.
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    ignored: Vec<String>,
    /// Do not append a content checksum to the frame
    #[arg(long)]
    no_check: bool,
    /// Window log passed through to the compressor
    #[arg(long, value_name = "N")]
    window_log: Option<u32>,
    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("compressed data cannot be written to a terminal")]
    TerminalOutput,
    #[error("stdout: {0}")]
    Stdout(#[source] io::Error),
    #[error("{}", describe(.op, .source))]
    Writer { op: &'static str, source: WriterError },
    #[error("stdin error: {0}")]
    Stdin(#[source] io::Error),
}

/// `<op>: <detail>`, or just `<detail>` when the detail already names `op`.
fn describe(op: &str, err: &WriterError) -> String {
    match err.origin() {
        Some(origin) if origin == op => err.to_string(),
        _ => format!("{op}: {err}"),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{PROG}: {e}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    if io::stdout().is_terminal() {
        return Err(CliError::TerminalOutput);
    }
    if io::stdin().is_terminal() {
        eprintln!("{PROG}: reading input from a terminal");
    }

    let level = cli
        .level
        .as_deref()
        .and_then(parse_level)
        .unwrap_or(DEFAULT_COMPRESSION_LEVEL);
    if !cli.ignored.is_empty() {
        debug!(ignored = ?cli.ignored, "ignoring extra arguments");
    }

    let mut out = stdout_file().map_err(CliError::Stdout)?;
    let seekable = out.stream_position().is_ok();
    let appending = appends(&out);
    debug!(level, seekable, appending, "stdout probed");

    let mut opts = WriterOptions::new(level)
        .record_size(seekable && !appending)
        .record_checksum(!cli.no_check);
    if let Some(window_log) = cli.window_log {
        opts = opts.window_log(window_log);
    }

    let mut writer = FrameWriter::open(out, &opts)
        .map_err(|source| CliError::Writer { op: "open", source })?;

    let mut rng = rand::thread_rng();
    let mut buf = vec![0u8; MAX_CHUNK];
    let mut input = io::stdin().lock();
    let mut stdin_error = None;
    loop {
        let size = rng.gen_range(1..=MAX_CHUNK);
        let n = match read_chunk(&mut input, &mut buf[..size]) {
            Ok(n) => n,
            Err(e) => {
                stdin_error = Some(e);
                break;
            }
        };
        if n == 0 {
            break;
        }
        writer
            .write(&buf[..n])
            .map_err(|source| CliError::Writer { op: "write", source })?;
    }

    writer
        .close()
        .map_err(|source| CliError::Writer { op: "close", source })?;

    match stdin_error {
        Some(e) => Err(CliError::Stdin(e)),
        None => Ok(()),
    }
}

/// Parse `-<digits>`; anything else leaves the default level.
fn parse_level(arg: &str) -> Option<i32> {
    let digits = arg.strip_prefix('-')?;
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse().ok()
}

/// Fill `buf` unless EOF comes first.  Returns bytes read.
fn read_chunk<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// A `File` sharing stdout's descriptor, so it can be probed for and used
/// with seeking.
#[cfg(unix)]
fn stdout_file() -> io::Result<File> {
    use std::os::fd::AsFd;
    Ok(File::from(io::stdout().as_fd().try_clone_to_owned()?))
}

#[cfg(windows)]
fn stdout_file() -> io::Result<File> {
    use std::os::windows::io::AsHandle;
    Ok(File::from(io::stdout().as_handle().try_clone_to_owned()?))
}

/// Whether writes to `file` always land at its end, whatever its offset.
#[cfg(unix)]
fn appends(file: &File) -> bool {
    use std::os::fd::AsRawFd;
    let flags = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETFL) };
    flags != -1 && flags & libc::O_APPEND != 0
}

#[cfg(not(unix))]
fn appends(_: &File) -> bool {
    false
}
