pub mod diff;
pub mod options;
pub mod target;
pub mod transport;

pub use diff::{diff_tail, TailDiff};
pub use options::{parse_choice_options, stock_options};
pub use target::{PaneTarget, TargetParseError};
pub use transport::{MuxError, PaneTransport, TmuxConfig, TmuxTransport};
