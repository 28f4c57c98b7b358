pub mod message;
pub mod room;

pub use message::{Message, MessageType, ReactionMap, Reactor, ReplyRef};
pub use room::RoomKey;
