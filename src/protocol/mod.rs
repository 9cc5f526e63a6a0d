//! Wire protocol spoken with the scanner firmware.
//!
//! Newline-delimited ASCII in both directions: commands are `!`-terminated tokens
//! ([`command`]), replies are `I`/`E` prefixed lines ([`parser`]).

pub mod command;
pub mod parser;

pub use command::{Command, CommandBatch};
pub use parser::{parse_line, LineAssembler, Message, MAX_LINE_LEN};
