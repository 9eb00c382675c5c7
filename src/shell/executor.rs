//! Execution engine
//!
//! Takes one line at a time through
//! `Idle -> Resolving -> BuildingIo -> Running -> Idle`:
//!
//! 1. Parse; a line of bare assignments just sets variables
//! 2. Resolve the command: builtins, then `PATH`, then a direct path
//! 3. Open every redirection handle, writes before reads
//! 4. Invoke the command, driving a suspended body through the scheduler
//! 5. Close the handles, return to `Idle`, store the exit code in `?`
//!
//! Only one command runs at a time. Handles and line-local exports are
//! released however the command ends, including when its future is
//! dropped mid-flight.

use super::builtins;
use super::command::{Executable, Outcome};
use super::environment::{Environment, STATUS};
use super::io::{Io, Process};
use super::parser::{self, ParsedLine, Redirection};
use super::scheduler;
use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::kernel::{Signal, SignalFlag, Timers};
use crate::vfs::{self, Devices, Entry, FileHandle, FileSystem, OpenMode};
use futures::future::{self, LocalBoxFuture};
use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Where the engine is in the current command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Idle,
    Resolving,
    BuildingIo,
    Running,
}

pub struct Shell {
    env: RefCell<Environment>,
    fs: FileSystem,
    process: Rc<dyn Process>,
    state: Cell<ShellState>,
    signal: SignalFlag,
    timers: Timers,
    exit: Cell<Option<i32>>,
    builtins: BTreeMap<String, Executable>,
    motd: Option<String>,
}

/// Holds the shell out of `Idle` for one command
struct Active {
    shell: Rc<Shell>,
    scoped: Cell<bool>,
}

impl Active {
    fn enter(shell: Rc<Shell>) -> Self {
        shell.state.set(ShellState::Resolving);
        Self {
            shell,
            scoped: Cell::new(false),
        }
    }

    fn push_scope(&self, exports: &[(String, String)]) {
        self.shell.env.borrow_mut().push_scope(exports);
        self.scoped.set(true);
    }
}

impl Drop for Active {
    fn drop(&mut self) {
        if self.scoped.get() {
            self.shell.env.borrow_mut().pop_scope();
        }
        // A signal that arrived after the last step has nothing left to cancel
        self.shell.signal.take();
        self.shell.state.set(ShellState::Idle);
    }
}

impl Shell {
    pub fn new(env: Environment, fs: FileSystem, process: Rc<dyn Process>, timers: Timers) -> Self {
        Self {
            env: RefCell::new(env),
            fs,
            process,
            state: Cell::new(ShellState::Idle),
            signal: SignalFlag::new(),
            timers,
            exit: Cell::new(None),
            builtins: builtins::builtins(),
            motd: None,
        }
    }

    /// Shell with the configured environment, mounts, and motd
    pub fn from_config(
        config: &ShellConfig,
        devices: &Devices,
        process: Rc<dyn Process>,
        timers: Timers,
    ) -> Self {
        let fs = FileSystem::from_fstab(&config.fstab, devices);
        let mut shell = Self::new(config.initial_environment(), fs, process, timers);
        shell.motd = config.motd.clone();
        shell
    }

    /// Run the motd command, if there is one
    pub fn start(self: &Rc<Self>) -> LocalBoxFuture<'static, ShellResult<i32>> {
        match &self.motd {
            Some(motd) => self.execute(motd),
            None => Box::pin(future::ready(Ok(0))),
        }
    }

    /// Run one line to completion.
    ///
    /// Fails only with `Busy` if a command is already running. Everything
    /// else, including an unknown command, becomes the returned exit code.
    pub fn execute(self: &Rc<Self>, line: &str) -> LocalBoxFuture<'static, ShellResult<i32>> {
        if self.state.get() != ShellState::Idle {
            tracing::debug!(line, state = ?self.state.get(), "refusing line while busy");
            return Box::pin(future::ready(Err(ShellError::Busy)));
        }

        let parsed = parser::parse(line, &self.env.borrow());
        let active = Active::enter(Rc::clone(self));
        Box::pin(async move {
            let shell = Rc::clone(&active.shell);
            let code = shell.run(parsed, &active).await;
            drop(active);
            shell.env.borrow_mut().set(STATUS, code.to_string());
            tracing::debug!(code, "command finished");
            Ok(code)
        })
    }

    async fn run(&self, parsed: ParsedLine, active: &Active) -> i32 {
        let Some(name) = parsed.args.first().cloned() else {
            let mut env = self.env.borrow_mut();
            for var in parsed.variables {
                env.set(var.name, var.value);
            }
            return 0;
        };

        active.push_scope(&parsed.exports());

        let Some(command) = self.resolve(&name) else {
            tracing::debug!(command = %name, "command not found");
            let err = ShellError::CommandNotFound(name);
            self.process.write_error_line(&err.to_string());
            return err.exit_code();
        };

        self.state.set(ShellState::BuildingIo);
        let mut io = self.build_io(&name, &parsed.redirections);

        self.state.set(ShellState::Running);
        tracing::debug!(command = %name, args = parsed.args.len() - 1, "running");
        let code = match command.run(&parsed.args[1..], self, &mut io) {
            Outcome::Exit(code) => code,
            Outcome::NoOp => 0,
            Outcome::Suspend(computation) => scheduler::drive(computation, self, &mut io).await,
        };
        io.release();
        code
    }

    /// Builtin, `PATH` entry, or executable file at `name` (relative to
    /// `PWD`), in that order
    fn resolve(&self, name: &str) -> Option<Executable> {
        if let Some(builtin) = self.builtins.get(name) {
            return Some(builtin.clone());
        }
        if let Some(found) = self.executables_in_path().remove(name) {
            return Some(found);
        }
        self.fs.executable(&self.resolve_path(name))
    }

    fn build_io(&self, command: &str, redirections: &[Redirection]) -> Io {
        let open = |redirection: &Redirection| {
            let path = self.resolve_path(&redirection.target);
            let handle = self.fs.open(&path, redirection.mode.open_mode());
            if let Some(message) = handle.error_message() {
                tracing::debug!(path = %path, error = %message, "redirection unavailable");
            }
            handle
        };
        let outputs = redirections
            .iter()
            .filter(|r| r.mode.is_write())
            .map(&open)
            .collect();
        let inputs = redirections
            .iter()
            .filter(|r| !r.mode.is_write())
            .map(&open)
            .collect();
        Io::new(self.process.clone(), command, self.signal.clone()).with_redirections(outputs, inputs)
    }

    /// Every command reachable by bare name. Builtins come first; an
    /// earlier `PATH` directory wins over a later one.
    pub fn executables_in_path(&self) -> BTreeMap<String, Executable> {
        let mut found = self.builtins.clone();
        let path = self.getenv("PATH").unwrap_or_default();
        for dir in path.split(':').filter(|d| !d.is_empty()) {
            let dir = self.resolve_path(dir);
            let Ok(entry) = self.fs.get(&dir) else {
                continue;
            };
            for child in entry.children() {
                if found.contains_key(child) {
                    continue;
                }
                if let Some(executable) = self.fs.executable(&vfs::resolve_from(&dir, child)) {
                    found.insert(child.clone(), executable);
                }
            }
        }
        found
    }

    // ============ Environment ============

    pub fn getenv(&self, key: &str) -> Option<String> {
        self.env.borrow().get(key)
    }

    pub fn setenv(&self, key: impl Into<String>, value: impl Into<String>) {
        self.env.borrow_mut().set(key, value);
    }

    pub fn hasenv(&self, key: &str) -> bool {
        self.env.borrow().has(key)
    }

    pub fn env(&self) -> Ref<'_, Environment> {
        self.env.borrow()
    }

    /// Expand `$NAME` and `${NAME}` against the environment
    pub fn substitute(&self, text: &str) -> String {
        self.env.borrow().substitute(text, &HashMap::new())
    }

    /// Exit code of the last command
    pub fn last_status(&self) -> i32 {
        self.getenv(STATUS)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    // ============ Filesystem ============

    pub fn cwd(&self) -> String {
        self.getenv("PWD").unwrap_or_else(|| "/".to_string())
    }

    /// Absolute form of `path`, relative paths taken from `PWD`
    pub fn resolve_path(&self, path: &str) -> String {
        vfs::resolve_from(&self.cwd(), path)
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    pub fn get_path(&self, path: &str) -> ShellResult<Entry> {
        Ok(self.fs.get(&self.resolve_path(path))?)
    }

    pub fn open_file(&self, path: &str, mode: OpenMode) -> FileHandle {
        self.fs.open(&self.resolve_path(path), mode)
    }

    pub fn create_file(&self, path: &str) -> ShellResult<()> {
        self.fs.create(&self.resolve_path(path))?;
        Ok(())
    }

    pub fn chmod(&self, path: &str, mode: &str) -> bool {
        self.fs.chmod(&self.resolve_path(path), mode)
    }

    pub fn mounts(&self) -> Vec<String> {
        self.fs.mounts()
    }

    // ============ Host ============

    pub fn process(&self) -> Rc<dyn Process> {
        self.process.clone()
    }

    pub fn clear(&self) {
        self.process.clear();
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Wait `ms` milliseconds, ending early if the shell is signalled.
    /// The signal stays raised so the scheduler still sees it.
    pub fn sleep(&self, ms: f64) -> LocalBoxFuture<'static, ()> {
        let sleep = self.signal.interruptible(self.timers.sleep(ms));
        Box::pin(async move {
            if sleep.await.is_err() {
                tracing::debug!("sleep interrupted");
            }
        })
    }

    pub fn state(&self) -> ShellState {
        self.state.get()
    }

    /// Cancellation flag; raising it cancels the running command
    pub fn signal(&self) -> SignalFlag {
        self.signal.clone()
    }

    /// Deliver a signal from the host
    pub fn trap(&self, signal: Signal) {
        let idle = self.state.get() == ShellState::Idle;
        tracing::info!(%signal, idle, "signal");
        match signal {
            Signal::Interrupt if idle => self.request_exit(self.last_status()),
            Signal::Interrupt => self.signal.raise(),
            Signal::Hangup => self.request_exit(self.last_status()),
        }
    }

    pub fn request_exit(&self, code: i32) {
        self.exit.set(Some(code));
    }

    /// Exit code, once the shell has been asked to exit
    pub fn exit_requested(&self) -> Option<i32> {
        self.exit.get()
    }

    // ============ Line editing support ============

    /// `PS1` with `\u`, `\h`, and `\w` filled in
    pub fn prompt(&self) -> String {
        let Some(ps1) = self.getenv("PS1") else {
            return "$ ".to_string();
        };
        let mut prompt = String::new();
        let mut chars = ps1.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                prompt.push(c);
                continue;
            }
            match chars.next() {
                Some('u') => prompt.push_str(&self.getenv("USER").unwrap_or_default()),
                Some('h') => prompt.push_str(&self.getenv("HOSTNAME").unwrap_or_default()),
                Some('w') => prompt.push_str(&self.display_cwd()),
                Some(other) => {
                    prompt.push('\\');
                    prompt.push(other);
                }
                None => prompt.push('\\'),
            }
        }
        prompt
    }

    /// `PWD` with `HOME` shown as `~`
    fn display_cwd(&self) -> String {
        let cwd = self.cwd();
        match self.getenv("HOME") {
            Some(home) if cwd == home => "~".to_string(),
            Some(home) if home != "/" && cwd.starts_with(&format!("{}/", home)) => {
                format!("~{}", &cwd[home.len()..])
            }
            _ => cwd,
        }
    }

    /// Candidates for the last word of `line`: command names for the first
    /// word, directory entries after that
    pub fn completions(&self, line: &str) -> Vec<String> {
        let line = line.trim_start();
        let word = line.rsplit(' ').next().unwrap_or_default();

        if !line.contains(' ') {
            return self
                .executables_in_path()
                .into_keys()
                .filter(|name| name.starts_with(word))
                .collect();
        }

        let (dir, prefix) = match word.rfind('/') {
            Some(i) => (&word[..=i], &word[i + 1..]),
            None => ("", word),
        };
        let Ok(entry) = self.get_path(if dir.is_empty() { "." } else { dir }) else {
            return Vec::new();
        };
        entry
            .children()
            .iter()
            .filter(|child| child.starts_with(prefix))
            .map(|child| format!("{}{}", dir, child))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{ManualClock, Runtime};
    use crate::shell::command::Step;
    use crate::shell::io::tests::Capture;
    use crate::vfs::{FstabEntry, StaticFs, TmpFs, TreeSpec};

    fn echo(args: &[String], _: &Shell, io: &mut Io) -> Outcome {
        io.write_line(&args.join(" "));
        Outcome::NoOp
    }

    fn fail(_: &[String], _: &Shell, _: &mut Io) -> Outcome {
        Outcome::Exit(3)
    }

    fn show(args: &[String], shell: &Shell, io: &mut Io) -> Outcome {
        io.write_line(&shell.getenv(&args[0]).unwrap_or_default());
        Outcome::NoOp
    }

    fn count(_: &[String], _: &Shell, _: &mut Io) -> Outcome {
        let mut n = 0;
        Outcome::suspend(move |_: &Shell, io: &mut Io| {
            n += 1;
            io.write_line(&n.to_string());
            if n == 3 { Step::done(0) } else { Step::Yield }
        })
    }

    fn tree() -> TreeSpec {
        TreeSpec::dir()
            .child(
                "bin",
                TreeSpec::dir()
                    .child("echo", TreeSpec::exec(echo))
                    .child("fail", TreeSpec::exec(fail))
                    .child("show", TreeSpec::exec(show))
                    .child("count", TreeSpec::exec(count))
                    .child("notes", TreeSpec::text("not a program")),
            )
            .child(
                "usr",
                TreeSpec::dir().child("bin", TreeSpec::dir().child("echo", TreeSpec::exec(fail))),
            )
            .child("home", TreeSpec::dir().child("run", TreeSpec::exec(fail)))
    }

    fn shell() -> (Rc<Shell>, Rc<Capture>, Runtime<Rc<ManualClock>>) {
        let runtime = Runtime::new(Rc::new(ManualClock::new()));
        let mut fs = FileSystem::new();
        fs.mount(&FstabEntry::new("base", "/", "jfs", ""), Box::new(StaticFs::new(&tree())));
        fs.mount(&FstabEntry::new("scratch", "/tmp", "tmpfs", ""), Box::new(TmpFs::new()));
        let env = Environment::with_vars([
            ("PATH", "/bin/:/usr/bin/"),
            ("PWD", "/home"),
            ("HOME", "/home"),
            ("USER", "ada"),
            ("HOSTNAME", "box"),
        ]);
        let capture = Rc::new(Capture::default());
        let shell = Rc::new(Shell::new(env, fs, capture.clone(), runtime.timers()));
        (shell, capture, runtime)
    }

    fn run(shell: &Rc<Shell>, runtime: &mut Runtime<Rc<ManualClock>>, line: &str) -> i32 {
        runtime.block_on(shell.execute(line)).unwrap().unwrap()
    }

    // ============ Resolution ============

    #[test]
    fn test_runs_path_command() {
        let (shell, capture, mut rt) = shell();
        assert_eq!(run(&shell, &mut rt, "echo hello world"), 0);
        assert_eq!(*capture.out.borrow(), vec!["hello world"]);
    }

    #[test]
    fn test_earlier_path_entry_wins() {
        let (shell, _, mut rt) = shell();
        // /usr/bin/echo exits 3, /bin/echo is found first
        assert_eq!(run(&shell, &mut rt, "echo"), 0);
        shell.setenv("PATH", "/usr/bin/:/bin/");
        assert_eq!(run(&shell, &mut rt, "echo"), 3);
    }

    #[test]
    fn test_direct_path_lookup() {
        let (shell, _, mut rt) = shell();
        assert_eq!(run(&shell, &mut rt, "/bin/fail"), 3);
        assert_eq!(run(&shell, &mut rt, "./run"), 3);
        assert_eq!(run(&shell, &mut rt, "run"), 3);
    }

    #[test]
    fn test_command_not_found() {
        let (shell, capture, mut rt) = shell();
        assert_eq!(run(&shell, &mut rt, "nope > /tmp/out"), 127);
        assert_eq!(*capture.err.borrow(), vec!["Command not found: nope"]);
        assert_eq!(shell.getenv("?").as_deref(), Some("127"));
        assert!(shell.get_path("/tmp/out").is_err());
        assert_eq!(shell.state(), ShellState::Idle);
    }

    #[test]
    fn test_text_file_is_not_a_command() {
        let (shell, _, mut rt) = shell();
        assert_eq!(run(&shell, &mut rt, "notes"), 127);
    }

    #[test]
    fn test_builtins_are_listed_first() {
        let (shell, _, _) = shell();
        let names: Vec<_> = shell.executables_in_path().into_keys().collect();
        assert!(names.contains(&"exit".to_string()));
        assert!(names.contains(&"count".to_string()));
        assert!(!names.contains(&"notes".to_string()));
    }

    // ============ Variables ============

    #[test]
    fn test_bare_assignment_sets_variable() {
        let (shell, _, mut rt) = shell();
        assert_eq!(run(&shell, &mut rt, "X=1 Y=$X"), 0);
        assert_eq!(shell.getenv("X").as_deref(), Some("1"));
        assert_eq!(shell.getenv("Y").as_deref(), Some("1"));
        assert!(shell.hasenv("RANDOM"));
        assert!(!shell.hasenv("Z"));
    }

    #[test]
    fn test_line_local_export_is_restored() {
        let (shell, capture, mut rt) = shell();
        shell.setenv("X", "outer");
        run(&shell, &mut rt, "X=inner show X");
        run(&shell, &mut rt, "show X");
        assert_eq!(*capture.out.borrow(), vec!["inner", "outer"]);
    }

    #[test]
    fn test_status_variable() {
        let (shell, capture, mut rt) = shell();
        run(&shell, &mut rt, "fail");
        run(&shell, &mut rt, "echo $?");
        assert_eq!(*capture.out.borrow(), vec!["3"]);
        assert_eq!(shell.last_status(), 0);
    }

    // ============ Scheduling ============

    #[test]
    fn test_suspended_command_runs_to_completion() {
        let (shell, capture, mut rt) = shell();
        assert_eq!(run(&shell, &mut rt, "count"), 0);
        assert_eq!(*capture.out.borrow(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_busy_while_running() {
        let (shell, _, mut rt) = shell();
        let first = rt.spawn(shell.execute("count"));
        rt.tick();
        assert_eq!(shell.state(), ShellState::Running);
        let second = rt.block_on(shell.execute("echo"));
        assert_eq!(second, Some(Err(ShellError::Busy)));
        rt.run_until_stalled();
        drop(first);
        assert_eq!(shell.state(), ShellState::Idle);
    }

    #[test]
    fn test_trap_interrupt_cancels_running_command() {
        let (shell, capture, mut rt) = shell();
        let mut handle = rt.spawn(shell.execute("count > /tmp/n"));
        rt.tick();
        shell.trap(Signal::Interrupt);
        rt.run_until_stalled();
        assert_eq!(handle.try_result(), Some(Ok(1)));
        assert!(capture.out.borrow().is_empty());
        assert_eq!(
            shell.get_path("/tmp/n").unwrap().read_text().unwrap(),
            "1\n"
        );
        assert_eq!(shell.exit_requested(), None);
        assert!(!shell.signal().is_raised());
    }

    #[test]
    fn test_trap_while_idle_requests_exit() {
        let (shell, _, mut rt) = shell();
        run(&shell, &mut rt, "fail");
        shell.trap(Signal::Interrupt);
        assert_eq!(shell.exit_requested(), Some(3));
    }

    #[test]
    fn test_dropped_command_returns_to_idle() {
        let (shell, _, mut rt) = shell();
        let handle = rt.spawn(shell.execute("X=1 count"));
        rt.tick();
        assert_eq!(shell.getenv("X").as_deref(), Some("1"));
        rt.cancel(handle.id());
        assert_eq!(shell.state(), ShellState::Idle);
        assert_eq!(shell.getenv("X"), None);
    }

    // ============ Prompt and completion ============

    #[test]
    fn test_prompt() {
        let (shell, _, _) = shell();
        assert_eq!(shell.prompt(), "$ ");
        shell.setenv("PS1", "\\u@\\h:\\w$ ");
        assert_eq!(shell.prompt(), "ada@box:~$ ");
        shell.setenv("PWD", "/tmp");
        assert_eq!(shell.prompt(), "ada@box:/tmp$ ");
        shell.setenv("PWD", "/home/docs");
        assert_eq!(shell.prompt(), "ada@box:~/docs$ ");
    }

    #[test]
    fn test_complete_command_name() {
        let (shell, _, _) = shell();
        assert_eq!(shell.completions("co"), vec!["count"]);
        assert_eq!(shell.completions("e"), vec!["echo", "exit"]);
    }

    #[test]
    fn test_complete_path() {
        let (shell, _, _) = shell();
        assert_eq!(shell.completions("ls /bin/s"), vec!["/bin/show"]);
        assert_eq!(shell.completions("ls r"), vec!["run"]);
        // Mount points show up in their parent's listing
        assert_eq!(shell.completions("ls /t"), vec!["/tmp"]);
        assert!(shell.completions("ls /missing/x").is_empty());
    }
}
