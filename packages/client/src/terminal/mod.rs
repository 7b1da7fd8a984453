//! Line-oriented terminal front-end used by the `kizuna-client` binary.

mod command;
mod formatter;
mod runner;
mod ui;

pub use command::{CommandError, TerminalCommand};
pub use formatter::MessageFormatter;
pub use runner::run_terminal;
pub use ui::ScreenView;
