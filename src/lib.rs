//! vsh - A line-oriented shell over a mountable virtual filesystem
//!
//! Design principles:
//! - Tractable: bounded complexity, comprehensible by one human
//! - Single-threaded and cooperative: one command at a time, cancelled
//!   only between its steps
//! - Hosts plug in at traits: output and input ([`shell::Process`]),
//!   remote bodies ([`vfs::Fetcher`]), persisted state
//!   ([`vfs::KeyValueStore`]), and time ([`kernel::Clock`])
//!
//! ```no_run
//! use std::rc::Rc;
//! use vsh::config::ShellConfig;
//! use vsh::kernel::{Runtime, SystemClock};
//! use vsh::shell::{Process, Shell};
//!
//! # fn host() -> Rc<dyn Process> { unimplemented!() }
//! let mut runtime = Runtime::new(SystemClock::new());
//! let config = ShellConfig::default();
//! let shell = Rc::new(Shell::from_config(
//!     &config,
//!     &vsh::config::stock_devices(),
//!     host(),
//!     runtime.timers(),
//! ));
//! let status = runtime.block_on(shell.execute("ls /bin"));
//! ```

pub mod config;
pub mod error;
pub mod kernel;
pub mod shell;
pub mod vfs;
