//! Stock programs
//!
//! The base static tree mounted at `/`: everyday commands in `/bin` and
//! `/usr/bin`, a message of the day, and the writeable scratch directories.
//!
//! Programs that can run for a while (`yes`, `seq`, `sleep`, `less`) return
//! a computation so they can be interrupted between steps.

use super::command::{Outcome, Step};
use super::executor::Shell;
use super::io::Io;
use crate::error::ShellError;
use crate::vfs::TreeSpec;
use rand::seq::SliceRandom;
use std::cell::RefCell;
use std::rc::Rc;

pub const MOTD: &str = "Welcome to vsh!";

/// The root filesystem every default configuration mounts
pub fn base_tree() -> TreeSpec {
    let bin = TreeSpec::dir()
        .child("help", TreeSpec::exec(help))
        .child("echo", TreeSpec::exec(echo))
        .child("cat", TreeSpec::exec(cat))
        .child("cd", TreeSpec::exec(cd))
        .child("ls", TreeSpec::exec(ls))
        .child("env", TreeSpec::exec(env))
        .child("pwd", TreeSpec::exec(pwd))
        .child("whoami", TreeSpec::exec(whoami))
        .child("yes", TreeSpec::exec(yes))
        .child("sleep", TreeSpec::exec(sleep))
        .child("envsubst", TreeSpec::exec(envsubst))
        .child("seq", TreeSpec::exec(seq))
        .child("su", TreeSpec::exec(su))
        .child("uname", TreeSpec::exec(uname))
        .child("mount", TreeSpec::exec(mount))
        .child("chmod", TreeSpec::exec(chmod));

    let usr_bin = TreeSpec::dir()
        .child("date", TreeSpec::exec(date))
        .child("touch", TreeSpec::exec(touch))
        .child("less", TreeSpec::exec(less))
        .child("fortune", TreeSpec::exec(fortune));

    TreeSpec::dir()
        .child("bin", bin)
        .child("usr", TreeSpec::dir().child("bin", usr_bin))
        .child("etc", TreeSpec::dir().child("motd", TreeSpec::text(MOTD)))
        .child("home", TreeSpec::dir())
        .child("tmp", TreeSpec::dir().writeable())
        .child("var", TreeSpec::dir().writeable())
}

fn help(_: &[String], _: &Shell, io: &mut Io) -> Outcome {
    for line in [
        "I am here to help. Type commands to interact with the shell.",
        "The most important ones are:",
        "",
        "- ls: list all files",
        "- cat <file>: show the content of a file, e.g. try 'cat /etc/motd'",
        "- cd <dir>: change the working directory, e.g. try 'cd /etc' and then 'cat motd'",
        "- fortune: like a fortune cookie, but only the message",
        "",
        "There are many more commands. Press Tab to get a list of all of them.",
    ] {
        io.write_line(line);
    }
    Outcome::Exit(0)
}

fn echo(args: &[String], _: &Shell, io: &mut Io) -> Outcome {
    io.write_line(&args.join(" "));
    Outcome::Exit(0)
}

/// Content of a file, or the error line to report
fn read_file(shell: &Shell, path: &str) -> Result<String, String> {
    let entry = shell.get_path(path).map_err(|err| match err {
        ShellError::PathNotFound(_) => format!("{}: No such file or directory", path),
        other => format!("{}: {}", path, other),
    })?;
    if entry.is_dir() {
        return Err(format!("{}: Is a directory", path));
    }
    entry
        .read_text()
        .map_err(|err| format!("{}: {}", path, ShellError::from(err)))
}

fn cat(args: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    if args.is_empty() {
        return match io.read_all() {
            Ok(text) => {
                io.write_line(&text);
                Outcome::Exit(0)
            }
            Err(err) => {
                io.write_error_line(&format!("cat: {}", err));
                Outcome::Exit(1)
            }
        };
    }
    let mut code = 0;
    for path in args {
        match read_file(shell, path) {
            Ok(text) => io.write_line(&text),
            Err(message) => {
                io.write_error_line(&format!("cat: {}", message));
                code = 1;
            }
        }
    }
    Outcome::Exit(code)
}

fn cd(args: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    let target = match args.first() {
        Some(target) => target.clone(),
        None => shell.getenv("HOME").unwrap_or_else(|| "/".to_string()),
    };
    match shell.get_path(&target) {
        Ok(entry) if entry.is_dir() => {
            shell.setenv("PWD", entry.full_path);
            Outcome::NoOp
        }
        Ok(_) => {
            io.write_error_line(&format!("cd: not a directory {}", target));
            Outcome::Exit(1)
        }
        Err(_) => {
            io.write_error_line(&format!("cd: No such file or directory: {}", target));
            Outcome::Exit(1)
        }
    }
}

fn ls(args: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    let target = args.first().map(String::as_str).unwrap_or(".");
    match shell.get_path(target) {
        Ok(entry) if entry.is_dir() => {
            io.write_line(&entry.children().join(" "));
            Outcome::Exit(0)
        }
        Ok(entry) => {
            io.write_line(&entry.basename);
            Outcome::Exit(0)
        }
        Err(_) => {
            io.write_error_line(&format!("ls: No such file or directory: {}", target));
            Outcome::Exit(1)
        }
    }
}

fn env(_: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    let listing = shell.env().to_string();
    io.write_line(&listing);
    Outcome::Exit(0)
}

fn pwd(_: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    io.write_line(&shell.cwd());
    Outcome::Exit(0)
}

fn whoami(_: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    io.write_line(&shell.getenv("USER").unwrap_or_default());
    Outcome::Exit(0)
}

fn yes(args: &[String], _: &Shell, _: &mut Io) -> Outcome {
    let word = if args.is_empty() {
        "y".to_string()
    } else {
        args.join(" ")
    };
    Outcome::suspend(move |_: &Shell, io: &mut Io| {
        io.write_line(&word);
        Step::Yield
    })
}

fn sleep(args: &[String], _: &Shell, io: &mut Io) -> Outcome {
    let seconds = match args.first().map(|s| s.parse::<f64>()) {
        Some(Ok(seconds)) if seconds.is_finite() && seconds >= 0.0 => seconds,
        _ => {
            io.write_error_line("sleep: invalid time interval");
            return Outcome::Exit(1);
        }
    };
    let mut slept = false;
    Outcome::suspend(move |shell: &Shell, _: &mut Io| {
        if slept {
            return Step::done(0);
        }
        slept = true;
        Step::Await(shell.sleep(seconds * 1000.0))
    })
}

fn envsubst(_: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    match io.read_all() {
        Ok(text) => {
            io.write_line(&shell.substitute(&text));
            Outcome::Exit(0)
        }
        Err(err) => {
            io.write_error_line(&format!("envsubst: {}", err));
            Outcome::Exit(1)
        }
    }
}

fn seq(args: &[String], _: &Shell, io: &mut Io) -> Outcome {
    let bounds: Result<Vec<i64>, _> = args.iter().map(|a| a.parse::<i64>()).collect();
    let (mut next, last) = match bounds.as_deref() {
        Ok([last]) => (1, *last),
        Ok([first, last]) => (*first, *last),
        _ => {
            io.write_error_line("usage: seq [FIRST] LAST");
            return Outcome::Exit(1);
        }
    };
    Outcome::suspend(move |_: &Shell, io: &mut Io| {
        if next > last {
            return Step::done(0);
        }
        io.write_line(&next.to_string());
        match next.checked_add(1) {
            Some(n) => next = n,
            None => return Step::done(0),
        }
        Step::Yield
    })
}

fn su(_: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    io.write_line("¯\\_(ツ)_/¯");
    shell.setenv("USER", "root");
    Outcome::NoOp
}

fn uname(_: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    let host = shell.getenv("HOSTNAME").unwrap_or_else(|| "localhost".to_string());
    io.write_line(&format!(
        "vsh {} {} {}",
        host,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::ARCH
    ));
    Outcome::NoOp
}

fn mount(_: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    for line in shell.mounts() {
        io.write_line(&line);
    }
    Outcome::Exit(0)
}

fn chmod(args: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    let [mode, paths @ ..] = args else {
        io.write_error_line("usage: chmod +w|-w PATH...");
        return Outcome::Exit(1);
    };
    if !matches!(mode.as_str(), "+w" | "-w") || paths.is_empty() {
        io.write_error_line("usage: chmod +w|-w PATH...");
        return Outcome::Exit(1);
    }
    let mut code = 0;
    for path in paths {
        if !shell.chmod(path, mode) {
            io.write_error_line(&format!("chmod: cannot change {}", path));
            code = 1;
        }
    }
    Outcome::Exit(code)
}

/// Today's date, e.g. `Sun Oct 18 2026`
fn date(_: &[String], _: &Shell, io: &mut Io) -> Outcome {
    io.write_line(&chrono::Local::now().format("%a %b %d %Y").to_string());
    Outcome::Exit(0)
}

fn touch(args: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    let mut code = 0;
    for path in args {
        // An existing file is left alone
        if shell.get_path(path).is_ok() {
            continue;
        }
        if let Err(err) = shell.create_file(path) {
            tracing::debug!(path = %path, error = %err, "touch failed");
            io.write_error_line(&format!("touch: {}: Permission denied", path));
            code = 1;
        }
    }
    Outcome::Exit(code)
}

/// Show a file, then wait for Enter
fn less(args: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    let Some(path) = args.first() else {
        io.write_error_line("less: missing file operand");
        return Outcome::Exit(1);
    };
    let text = match read_file(shell, path) {
        Ok(text) => text,
        Err(message) => {
            io.write_error_line(&format!("less: {}", message));
            return Outcome::Exit(1);
        }
    };
    shell.clear();
    io.write_line(&text);
    io.write_line("");
    io.write_line(" === Press Enter to Finish === ");

    let key: Rc<RefCell<Option<Option<String>>>> = Rc::default();
    Outcome::suspend(move |_: &Shell, io: &mut Io| {
        // Key read during the previous step; `Some(None)` means input ended
        match key.borrow_mut().take() {
            Some(Some(k)) if k == "Enter" => return Step::done(0),
            Some(None) => return Step::done(0),
            _ => {}
        }
        let slot = key.clone();
        let read = io.read_char();
        // An interrupted read stores nothing; the scheduler cancels next
        Step::wait(async move {
            if let Ok(k) = read.await {
                *slot.borrow_mut() = Some(k);
            }
        })
    })
}

const FORTUNES: &[&str] = &[
    "Darmok and Jalad at Tanagra.",
    "Shaka, when the walls fell.",
    "Temba, his arms wide!",
    "Resistance is futile.",
    "Live long and prosper.",
    "I believe in coincidences. Coincidences happen every day. But I don't trust coincidences.",
    "The truth is usually just an excuse for lack of imagination.",
    "A friend is a present you give yourself.",
    "A smile is your personal welcome mat.",
    "All the effort you are making will ultimately pay off.",
    "An inch of time is an inch of gold.",
    "Curiosity kills boredom. Nothing can kill curiosity.",
    "Don't just think, act!",
    "Every flower blooms in its own sweet time.",
    "Fortune Not Found: Abort, Retry, Ignore?",
    "Have a beautiful day.",
    "Now is the time to try something new.",
    "Practice makes perfect.",
    "There's no such thing as an ordinary cat.",
];

fn fortune(_: &[String], _: &Shell, io: &mut Io) -> Outcome {
    let fortune = FORTUNES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default();
    io.write_line(fortune);
    Outcome::Exit(0)
}
