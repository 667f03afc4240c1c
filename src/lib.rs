mod command;
mod error;
mod events;
mod framing;
mod parser;
mod process;
mod utils;

pub use error::ExifToolError;
pub use events::{ExifToolEvent, ExitStatus, ProcessError, ProcessState};
pub use parser::{ExifToolParser, TagInfo, TagMap};
pub use process::ExifToolProcess;
