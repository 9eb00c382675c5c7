//! Per-command I/O
//!
//! Without redirections a command talks straight to the host [`Process`].
//! With them, output lines go to every write handle and input is the
//! contents of every read handle. Handles that failed to open turn each
//! write into a line on the error stream.

use crate::error::ShellError;
use crate::kernel::SignalFlag;
use crate::vfs::{FileHandle, OpenMode};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

/// The host: terminal, test harness, or anything else that shows output
pub trait Process {
    fn write_line(&self, line: &str);

    fn write_error_line(&self, line: &str);

    fn clear(&self);

    /// Everything on standard input
    fn read_all(&self) -> String;

    /// Next key, `"Enter"` for a newline. `None` once input has ended.
    fn read_char(&self) -> LocalBoxFuture<'static, Option<String>>;

    fn rows(&self) -> usize {
        24
    }

    fn columns(&self) -> usize {
        80
    }
}

/// A write redirection and what has gone through it
struct Output {
    handle: FileHandle,
    body: String,
    lines: usize,
}

impl Output {
    /// Overwrite handles replace the body on each write, so they are given
    /// everything written so far. Append handles get just the new line.
    fn write_line(&mut self, line: &str) -> Result<(), crate::error::FsError> {
        let result = match self.handle.mode() {
            OpenMode::Overwrite => {
                if self.lines > 0 {
                    self.body.push('\n');
                }
                self.body.push_str(line);
                self.handle.write(&self.body)
            }
            _ if self.lines == 0 => self.handle.write(line),
            _ => self.handle.write(&format!("\n{}", line)),
        };
        self.lines += 1;
        result
    }
}

pub struct Io {
    process: Rc<dyn Process>,
    command: String,
    signal: SignalFlag,
    outputs: Vec<Output>,
    inputs: Vec<FileHandle>,
}

impl Io {
    /// I/O straight to the host
    pub fn new(process: Rc<dyn Process>, command: &str, signal: SignalFlag) -> Self {
        Self {
            process,
            command: command.to_string(),
            signal,
            outputs: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Route output and input through redirection handles
    pub fn with_redirections(mut self, outputs: Vec<FileHandle>, inputs: Vec<FileHandle>) -> Self {
        self.outputs = outputs
            .into_iter()
            .map(|handle| Output {
                handle,
                body: String::new(),
                lines: 0,
            })
            .collect();
        self.inputs = inputs;
        self
    }

    pub fn write_line(&mut self, line: &str) {
        if self.outputs.is_empty() {
            self.process.write_line(line);
            return;
        }
        for output in &mut self.outputs {
            let reason = match output.handle.error_message() {
                Some(message) => message,
                None => match output.write_line(line) {
                    Ok(()) => continue,
                    Err(err) => {
                        tracing::debug!(path = output.handle.path(), error = %err, "write rejected");
                        err.to_string()
                    }
                },
            };
            let err = ShellError::RedirectionTargetUnavailable {
                target: output.handle.path().to_string(),
                reason,
            };
            self.process
                .write_error_line(&format!("{}: {}", self.command, err));
        }
    }

    pub fn write_error_line(&self, line: &str) {
        self.process.write_error_line(line);
    }

    pub fn clear(&self) {
        self.process.clear();
    }

    /// All input: the read handles joined by newlines, or the host's input
    pub fn read_all(&self) -> Result<String, ShellError> {
        if self.inputs.is_empty() {
            return Ok(self.process.read_all());
        }
        let mut parts = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            parts.push(input.read()?);
        }
        Ok(parts.join("\n"))
    }

    /// Next key from the host. Resolves to `Err(Interrupted)` if the shell
    /// is signalled first, and to `Ok(None)` if input has ended.
    pub fn read_char(&self) -> LocalBoxFuture<'static, Result<Option<String>, ShellError>> {
        let read = self.signal.interruptible(self.process.read_char());
        Box::pin(async move { read.await.map_err(|_| ShellError::Interrupted) })
    }

    pub fn rows(&self) -> usize {
        self.process.rows()
    }

    pub fn columns(&self) -> usize {
        self.process.columns()
    }

    /// Close every redirection handle once. Returns how many closed cleanly;
    /// handles that failed to open were never open and do not count.
    pub fn release(&mut self) -> usize {
        let mut closed = 0;
        let handles = self
            .outputs
            .drain(..)
            .map(|o| o.handle)
            .chain(self.inputs.drain(..));
        for mut handle in handles {
            if handle.is_error() {
                continue;
            }
            match handle.close() {
                Ok(()) => closed += 1,
                Err(err) => tracing::warn!(path = handle.path(), error = %err, "close failed"),
            }
        }
        if closed > 0 {
            tracing::debug!(command = %self.command, closed, "released redirection handles");
        }
        closed
    }
}

impl Drop for Io {
    fn drop(&mut self) {
        self.release();
    }
}
