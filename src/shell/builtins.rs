//! Built-in shell commands
//!
//! These run inside the shell rather than from the filesystem and take
//! precedence over anything of the same name on `PATH`.

use super::command::{Executable, Outcome};
use super::executor::Shell;
use super::io::Io;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Builtins by name
pub fn builtins() -> BTreeMap<String, Executable> {
    let mut map: BTreeMap<String, Executable> = BTreeMap::new();
    map.insert("exit".to_string(), Rc::new(exit));
    map.insert("clear".to_string(), Rc::new(clear));
    map
}

/// exit [code]: ask the host to end the session
fn exit(args: &[String], shell: &Shell, io: &mut Io) -> Outcome {
    let code = match args.first() {
        None => shell.last_status(),
        Some(arg) => match arg.parse() {
            Ok(code) => code,
            Err(_) => {
                io.write_error_line(&format!("exit: numeric argument required: {}", arg));
                return Outcome::Exit(1);
            }
        },
    };
    tracing::info!(code, "exit requested");
    shell.request_exit(code);
    Outcome::Exit(code)
}

fn clear(_: &[String], _: &Shell, io: &mut Io) -> Outcome {
    io.clear();
    Outcome::NoOp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let table = builtins();
        let names: Vec<&str> = table.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["clear", "exit"]);
    }
}
