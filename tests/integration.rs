//! Integration tests for vsh
//!
//! Whole command lines through the shell, the stock programs, and the
//! mounted filesystem, on the cooperative runtime with a manual clock.

use futures::future::{self, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use vsh::config::{self, BASE_DEVICE, ShellConfig};
use vsh::error::ShellError;
use vsh::kernel::{Clock, ManualClock, Runtime, Signal};
use vsh::shell::{Process, Shell, ShellState};
use vsh::vfs::{Devices, FstabEntry, MapFetcher, MemoryStore, TreeSpec};

/// Host that records output and replays scripted keys
#[derive(Default)]
struct Host {
    out: RefCell<Vec<String>>,
    err: RefCell<Vec<String>>,
    input: RefCell<String>,
    keys: RefCell<VecDeque<String>>,
    clears: Cell<usize>,
}

impl Process for Host {
    fn write_line(&self, line: &str) {
        self.out.borrow_mut().push(line.to_string());
    }

    fn write_error_line(&self, line: &str) {
        self.err.borrow_mut().push(line.to_string());
    }

    fn clear(&self) {
        self.clears.set(self.clears.get() + 1);
    }

    fn read_all(&self) -> String {
        self.input.borrow().clone()
    }

    fn read_char(&self) -> LocalBoxFuture<'static, Option<String>> {
        match self.keys.borrow_mut().pop_front() {
            Some(key) => Box::pin(future::ready(Some(key))),
            // Nobody is typing
            None => Box::pin(future::pending()),
        }
    }
}

struct Session {
    shell: Rc<Shell>,
    host: Rc<Host>,
    runtime: Runtime<Rc<ManualClock>>,
}

impl Session {
    fn new() -> Self {
        Self::with(ShellConfig::default(), config::stock_devices())
    }

    fn with(config: ShellConfig, devices: Devices) -> Self {
        let runtime = Runtime::new(Rc::new(ManualClock::new()));
        let host = Rc::new(Host::default());
        let shell = Rc::new(Shell::from_config(
            &config,
            &devices,
            host.clone(),
            runtime.timers(),
        ));
        Self {
            shell,
            host,
            runtime,
        }
    }

    /// Run a line to completion and return its exit code
    fn run(&mut self, line: &str) -> i32 {
        self.runtime
            .block_on(self.shell.execute(line))
            .expect("command stalled")
            .expect("shell busy")
    }

    fn out(&self) -> Vec<String> {
        self.host.out.borrow().clone()
    }

    fn err(&self) -> Vec<String> {
        self.host.err.borrow().clone()
    }

    fn read(&self, path: &str) -> String {
        self.shell.get_path(path).unwrap().read_text().unwrap()
    }
}

fn base_entry() -> FstabEntry {
    FstabEntry::new(BASE_DEVICE, "/", "jfs", "rw")
}

// ============================================================================
// Basic Shell Operations
// ============================================================================

#[test]
fn test_echo_command() {
    let mut s = Session::new();
    assert_eq!(s.run("echo hello world"), 0);
    assert_eq!(s.out(), vec!["hello world"]);
}

#[test]
fn test_quoting_reaches_the_command() {
    let mut s = Session::new();
    s.run(r#"echo "a  b" 'c $USER' d\ e"#);
    assert_eq!(s.out(), vec!["a  b c $USER d e"]);
}

#[test]
fn test_motd_on_start() {
    let mut s = Session::new();
    let code = s.runtime.block_on(s.shell.start()).unwrap().unwrap();
    assert_eq!(code, 0);
    assert_eq!(s.out(), vec!["Welcome to vsh!"]);
}

#[test]
fn test_cd_and_pwd() {
    let mut s = Session::new();
    s.run("pwd");
    assert_eq!(s.run("cd /etc"), 0);
    s.run("pwd");
    assert_eq!(s.out(), vec!["/home", "/etc"]);

    assert_eq!(s.run("cd motd"), 1);
    assert_eq!(s.run("cd /nope"), 1);
    assert_eq!(
        s.err(),
        vec!["cd: not a directory motd", "cd: No such file or directory: /nope"]
    );

    assert_eq!(s.run("cd"), 0);
    assert_eq!(s.shell.cwd(), "/home");
}

#[test]
fn test_ls_includes_mount_points() {
    let mut s = Session::new();
    s.run("ls /");
    assert_eq!(s.out(), vec!["bin etc home tmp usr var"]);
}

#[test]
fn test_status_variable() {
    let mut s = Session::new();
    s.run("nope");
    s.run("echo $?");
    assert_eq!(s.out(), vec!["127"]);
    assert_eq!(s.shell.last_status(), 0);
}

#[test]
fn test_line_local_variable() {
    let mut s = Session::new();
    s.run("USER=ada whoami");
    s.run("whoami");
    assert_eq!(s.out(), vec!["ada", "guest"]);
}

#[test]
fn test_su_changes_user() {
    let mut s = Session::new();
    s.run("su");
    s.run("whoami");
    assert_eq!(s.out(), vec!["¯\\_(ツ)_/¯", "root"]);
}

#[test]
fn test_exit_builtin() {
    let mut s = Session::new();
    assert_eq!(s.run("exit abc"), 1);
    assert_eq!(s.shell.exit_requested(), None);
    assert_eq!(s.run("exit 4"), 4);
    assert_eq!(s.shell.exit_requested(), Some(4));
}

#[test]
fn test_mount_listing() {
    let mut s = Session::new();
    s.run("mount");
    assert_eq!(
        s.out(),
        vec!["base on / type jfs (rw)", "scratch on /tmp type tmpfs (rw)"]
    );
}

// ============================================================================
// Command Resolution
// ============================================================================

#[test]
fn test_command_not_found_leaves_fs_untouched() {
    let mut s = Session::new();
    assert_eq!(s.run("frobnicate > /tmp/out"), 127);
    assert_eq!(s.err(), vec!["Command not found: frobnicate"]);
    assert!(s.shell.get_path("/tmp").unwrap().children().is_empty());
    assert_eq!(s.shell.state(), ShellState::Idle);
}

#[test]
fn test_direct_path_lookup() {
    let mut s = Session::new();
    s.shell.setenv("PATH", "");
    assert_eq!(s.run("echo x"), 127);
    assert_eq!(s.run("/bin/echo x"), 0);
    assert_eq!(s.run("/bin/cd /usr"), 0);
    assert_eq!(s.run("bin/fortune"), 0);
    assert_eq!(s.out().len(), 2);
}

#[test]
fn test_completions() {
    let s = Session::new();
    assert_eq!(s.shell.completions("fo"), vec!["fortune"]);
    assert_eq!(s.shell.completions("cat /etc/m"), vec!["/etc/motd"]);
}

// ============================================================================
// Redirection
// ============================================================================

#[test]
fn test_overwrite_and_append() {
    let mut s = Session::new();
    s.run("echo hello > /tmp/a");
    s.run("echo world >> /tmp/a");
    assert_eq!(s.read("/tmp/a"), "hello\nworld\n");

    s.run("echo again > /tmp/a");
    assert_eq!(s.read("/tmp/a"), "again\n");
    assert!(s.out().is_empty());
}

#[test]
fn test_multiline_output_to_file() {
    let mut s = Session::new();
    assert_eq!(s.run("seq 3 > /tmp/s"), 0);
    assert_eq!(s.read("/tmp/s"), "1\n2\n3\n");
}

#[test]
fn test_date() {
    let mut s = Session::new();
    assert_eq!(s.run("date"), 0);
    let out = s.out();
    assert_eq!(out.len(), 1);
    assert!(chrono::NaiveDate::parse_from_str(&out[0], "%a %b %d %Y").is_ok());
}

#[test]
fn test_seq_stops_at_largest_value() {
    let mut s = Session::new();
    assert_eq!(s.run("seq 9223372036854775806 9223372036854775807"), 0);
    assert_eq!(s.out(), vec!["9223372036854775806", "9223372036854775807"]);
}

#[test]
fn test_relative_redirection_target() {
    let mut s = Session::new();
    s.run("cd /tmp");
    s.run("echo here > note");
    assert_eq!(s.read("/tmp/note"), "here\n");
}

#[test]
fn test_input_redirection() {
    let mut s = Session::new();
    s.run("echo 'hi $USER' > /tmp/t");
    assert_eq!(s.run("envsubst < /tmp/t"), 0);
    assert_eq!(s.out(), vec!["hi guest\n"]);
}

#[test]
fn test_failed_redirection_still_runs_command() {
    let mut s = Session::new();
    // /etc is not writeable, so the handle is born closed
    assert_eq!(s.run("su > /etc/new"), 0);
    assert_eq!(s.err(), vec!["su: /etc/new: permission denied: new"]);
    assert_eq!(s.shell.getenv("USER").as_deref(), Some("root"));
    assert!(s.shell.get_path("/etc/new").is_err());
}

#[test]
fn test_chmod_makes_file_read_only() {
    let mut s = Session::new();
    assert_eq!(s.run("touch /tmp/x"), 0);
    assert_eq!(s.run("chmod -w /tmp/x"), 0);
    s.run("echo a > /tmp/x");
    assert_eq!(s.err(), vec!["echo: /tmp/x: permission denied: x"]);
    assert_eq!(s.read("/tmp/x"), "");

    assert_eq!(s.run("chmod +w /tmp/x"), 0);
    s.run("echo a > /tmp/x");
    assert_eq!(s.read("/tmp/x"), "a\n");
}

#[test]
fn test_touch_outside_writeable_dir() {
    let mut s = Session::new();
    assert_eq!(s.run("touch /etc/x"), 1);
    assert_eq!(s.err(), vec!["touch: /etc/x: Permission denied"]);
}

// ============================================================================
// Scheduling and Cancellation
// ============================================================================

#[test]
fn test_cancelled_command_closes_handles_once() {
    let mut s = Session::new();
    let mut handle = s.runtime.spawn(s.shell.execute("yes > /tmp/f"));

    // First step runs, then the signal arrives
    s.runtime.tick();
    s.shell.trap(Signal::Interrupt);
    s.runtime.run_until_stalled();

    assert_eq!(handle.try_result(), Some(Ok(1)));
    assert_eq!(s.read("/tmp/f"), "y\n");
    assert_eq!(s.shell.getenv("?").as_deref(), Some("1"));
    assert_eq!(s.shell.state(), ShellState::Idle);
    assert!(!s.shell.signal().is_raised());
}

#[test]
fn test_busy_while_command_runs() {
    let mut s = Session::new();
    let mut handle = s.runtime.spawn(s.shell.execute("yes"));
    s.runtime.tick();

    let refused = s.runtime.block_on(s.shell.execute("echo hi"));
    assert_eq!(refused, Some(Err(ShellError::Busy)));

    s.shell.trap(Signal::Interrupt);
    s.runtime.run_until_stalled();
    assert_eq!(handle.try_result(), Some(Ok(1)));
    assert_eq!(s.run("echo hi"), 0);
}

#[test]
fn test_sleep_waits_on_the_clock() {
    let mut s = Session::new();
    assert_eq!(s.run("sleep 5"), 0);
    assert!(s.runtime.clock().now() >= 5000.0);
}

#[test]
fn test_sleep_interrupted() {
    let mut s = Session::new();
    let mut handle = s.runtime.spawn(s.shell.execute("sleep 100"));
    s.runtime.tick();
    assert_eq!(s.runtime.timers().pending_count(), 1);

    s.shell.trap(Signal::Interrupt);
    s.runtime.run_until_stalled();
    assert_eq!(handle.try_result(), Some(Ok(1)));
    assert_eq!(s.runtime.timers().pending_count(), 0);
    assert_eq!(s.runtime.clock().now(), 0.0);
}

#[test]
fn test_sleep_rejects_bad_interval() {
    let mut s = Session::new();
    assert_eq!(s.run("sleep soon"), 1);
    assert_eq!(s.err(), vec!["sleep: invalid time interval"]);

    assert_eq!(s.run("sleep inf"), 1);
    assert_eq!(s.run("sleep NaN"), 1);
    assert_eq!(s.run("sleep -1"), 1);
    assert_eq!(s.err().len(), 4);
    assert_eq!(s.runtime.clock().now(), 0.0);
}

#[test]
fn test_sleep_far_future() {
    let mut s = Session::new();
    assert_eq!(s.run("sleep 1e20"), 0);
    assert!(s.runtime.clock().now() >= 1e23);
}

#[test]
fn test_less_waits_for_enter() {
    let mut s = Session::new();
    s.host
        .keys
        .borrow_mut()
        .extend(["q".to_string(), "Enter".to_string()]);
    assert_eq!(s.run("less /etc/motd"), 0);
    assert_eq!(s.host.clears.get(), 1);
    assert_eq!(
        s.out(),
        vec!["Welcome to vsh!", "", " === Press Enter to Finish === "]
    );
    assert!(s.host.keys.borrow().is_empty());
}

#[test]
fn test_less_cancelled_while_waiting() {
    let mut s = Session::new();
    let mut handle = s.runtime.spawn(s.shell.execute("less /etc/motd"));
    s.runtime.run_until_stalled();
    assert_eq!(s.shell.state(), ShellState::Running);

    s.shell.trap(Signal::Interrupt);
    s.runtime.run_until_stalled();
    assert_eq!(handle.try_result(), Some(Ok(1)));
}

#[test]
fn test_interrupt_at_prompt_requests_exit() {
    let mut s = Session::new();
    s.run("nope");
    s.shell.trap(Signal::Interrupt);
    assert_eq!(s.shell.exit_requested(), Some(127));
}

// ============================================================================
// Mounts and Backends
// ============================================================================

#[test]
fn test_longest_prefix_mount_wins() {
    let config = ShellConfig {
        fstab: vec![base_entry(), FstabEntry::new("etc", "/etc", "jfs", "ro")],
        ..Default::default()
    };
    let devices = config::stock_devices()
        .with_tree("etc", TreeSpec::dir().child("motd", TreeSpec::text("mounted etc")));
    let mut s = Session::with(config, devices);

    s.run("cat /etc/motd");
    assert_eq!(s.out(), vec!["mounted etc"]);

    // Read-only mount refuses writes even where the tree would allow them
    assert_eq!(s.run("touch /etc/new"), 1);
}

#[test]
fn test_unknown_mount_is_skipped() {
    let config = ShellConfig {
        fstab: vec![
            base_entry(),
            FstabEntry::new("disk", "/mnt", "ext4", ""),
        ],
        ..Default::default()
    };
    let mut s = Session::with(config, config::stock_devices());
    s.run("mount");
    assert_eq!(s.out(), vec!["base on / type jfs (rw)"]);
}

#[test]
fn test_persisted_home_survives_restart() {
    let store = Rc::new(MemoryStore::new());
    let config = ShellConfig {
        fstab: vec![base_entry(), FstabEntry::new("home", "/home", "wsfs", "")],
        ..Default::default()
    };

    let mut first = Session::with(
        config.clone(),
        config::stock_devices().with_store(store.clone()),
    );
    assert_eq!(first.run("echo note > /home/n"), 0);
    drop(first);

    let mut second = Session::with(config, config::stock_devices().with_store(store));
    assert_eq!(second.run("cat /home/n"), 0);
    assert_eq!(second.out(), vec!["note\n"]);
}

#[test]
fn test_remote_mount() {
    let fetcher = Rc::new(MapFetcher::new());
    fetcher.insert(
        "http://files/_index.json",
        r#"{"/": {"children": {"README": "inline", "guide.txt": {}}}}"#,
    );
    fetcher.insert("http://files/guide.txt", "remote body");

    let config = ShellConfig {
        fstab: vec![
            base_entry(),
            FstabEntry::new("http://files", "/srv", "httpfs", ""),
        ],
        ..Default::default()
    };
    let mut s = Session::with(config, config::stock_devices().with_fetcher(fetcher));

    s.run("ls /srv");
    s.run("cat /srv/README /srv/guide.txt");
    assert_eq!(s.out(), vec!["README guide.txt", "inline", "remote body"]);

    assert_eq!(s.run("touch /srv/new"), 1);

    let stores = s.shell.fs().list_backing_store();
    let (_, srv) = stores.iter().find(|(mp, _)| mp == "/srv").unwrap();
    assert_eq!(
        *srv,
        vec!["http://files/_index.json", "http://files/guide.txt"]
    );
}

#[test]
fn test_remote_unreachable() {
    let config = ShellConfig {
        fstab: vec![
            base_entry(),
            FstabEntry::new("http://down", "/srv", "httpfs", ""),
        ],
        ..Default::default()
    };
    let devices = config::stock_devices().with_fetcher(Rc::new(MapFetcher::new()));
    let mut s = Session::with(config, devices);

    assert_eq!(s.run("cat /srv/x"), 1);
    let err = s.err();
    assert_eq!(err.len(), 1);
    assert!(err[0].contains("404 not found"));
}
