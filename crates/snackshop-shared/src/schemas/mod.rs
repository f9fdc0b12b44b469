pub mod notification;
pub mod shell_event;

pub use notification::*;
pub use shell_event::*;
