pub mod alert;
pub mod dispatcher;
pub mod format;
pub mod render;
pub mod severity;

pub use alert::{AlertDispatcher, SoundPlayer};
pub use dispatcher::{DispatchReport, StreamDispatcher};
pub use render::{DisplayLine, LineFormatter, Tint};
pub use severity::{Breakpoints, Classification, Severity, SeverityTable, Tier};
