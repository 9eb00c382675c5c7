//! vsh - native terminal host
//!
//! Runs the shell on the cooperative runtime with stdin/stdout as the
//! process. Ctrl-C cancels the running command; at the prompt it ends the
//! session, as does end of input.

use clap::Parser;
use futures::StreamExt;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future::{self, LocalBoxFuture};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use vsh::config::{self, ShellConfig};
use vsh::kernel::{Runtime, Signal, SystemClock};
use vsh::shell::{Process, Shell};
use vsh::vfs::{DirFetcher, DirStore};

/// vsh - a small shell over a virtual filesystem
#[derive(Parser, Debug)]
#[command(name = "vsh", version, about)]
struct Args {
    /// JSON configuration file
    #[arg(long, env = "VSH_CONFIG")]
    config: Option<PathBuf>,

    /// Execute command and exit
    #[arg(short = 'c')]
    command: Option<String>,

    /// Directory that remote (httpfs) mounts read from
    #[arg(long)]
    remote_root: Option<PathBuf>,

    /// Directory that persisted (wsfs) mounts save to
    #[arg(long, env = "VSH_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Lines from stdin, also handed out one key at a time
struct Input {
    lines: RefCell<UnboundedReceiver<String>>,
    keys: RefCell<VecDeque<String>>,
}

impl Input {
    /// Read stdin on its own thread; the receiver wakes the runtime
    fn spawn() -> Rc<Self> {
        let (tx, rx) = mpsc::unbounded();
        std::thread::spawn(move || read_stdin(tx));
        Rc::new(Self {
            lines: RefCell::new(rx),
            keys: RefCell::new(VecDeque::new()),
        })
    }

    async fn next_line(self: Rc<Self>) -> Option<String> {
        future::poll_fn(|cx| self.lines.borrow_mut().poll_next_unpin(cx)).await
    }

    async fn next_key(self: Rc<Self>) -> Option<String> {
        if let Some(key) = self.keys.borrow_mut().pop_front() {
            return Some(key);
        }
        let line = self.clone().next_line().await?;
        let mut keys = self.keys.borrow_mut();
        keys.extend(line.chars().map(String::from));
        keys.push_back("Enter".to_string());
        keys.pop_front()
    }

    /// Whatever has been typed ahead, without waiting
    fn drain(&self) -> String {
        let mut lines = Vec::new();
        while let Ok(Some(line)) = self.lines.borrow_mut().try_next() {
            lines.push(line);
        }
        lines.join("\n")
    }
}

fn read_stdin(tx: UnboundedSender<String>) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if tx.unbounded_send(line).is_err() {
            break;
        }
    }
    tracing::debug!("stdin closed");
}

struct Terminal {
    input: Rc<Input>,
}

impl Process for Terminal {
    fn write_line(&self, line: &str) {
        println!("{}", line);
    }

    fn write_error_line(&self, line: &str) {
        eprintln!("{}", line);
    }

    fn clear(&self) {
        print!("\x1b[2J\x1b[H");
        let _ = io::stdout().flush();
    }

    fn read_all(&self) -> String {
        self.input.drain()
    }

    fn read_char(&self) -> LocalBoxFuture<'static, Option<String>> {
        Box::pin(self.input.clone().next_key())
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = match &args.config {
        Some(path) => match ShellConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("vsh: {}", e);
                return ExitCode::from(2);
            }
        },
        None => ShellConfig::default(),
    };

    let mut devices = config::stock_devices();
    if let Some(root) = args.remote_root {
        devices = devices.with_fetcher(Rc::new(DirFetcher::new(root)));
    }
    if let Some(dir) = args.state_dir {
        devices = devices.with_store(Rc::new(DirStore::new(dir)));
    }

    let mut runtime = Runtime::new(SystemClock::new());
    let input = Input::spawn();
    let terminal = Rc::new(Terminal {
        input: input.clone(),
    });
    let shell = Rc::new(Shell::from_config(
        &config,
        &devices,
        terminal,
        runtime.timers(),
    ));

    let signal = shell.signal();
    if let Err(e) = ctrlc::set_handler(move || signal.raise()) {
        tracing::warn!(error = %e, "cannot install Ctrl-C handler");
    }

    if let Some(command) = args.command {
        return match runtime.block_on(shell.execute(&command)) {
            Some(Ok(code)) => exit_code(code),
            Some(Err(e)) => {
                eprintln!("vsh: {}", e);
                ExitCode::FAILURE
            }
            None => ExitCode::FAILURE,
        };
    }

    runtime.block_on(shell.start());

    loop {
        if let Some(code) = shell.exit_requested() {
            return exit_code(code);
        }

        print!("{}", shell.prompt());
        let _ = io::stdout().flush();

        let read = shell.signal().interruptible(input.clone().next_line());
        match runtime.block_on(read) {
            Some(Ok(Some(line))) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(Err(e)) = runtime.block_on(shell.execute(&line)) {
                    eprintln!("vsh: {}", e);
                }
            }
            Some(Err(_)) => {
                shell.signal().take();
                println!();
                shell.trap(Signal::Interrupt);
            }
            Some(Ok(None)) | None => {
                println!();
                shell.trap(Signal::Hangup);
            }
        }
    }
}
