pub mod protocol;
pub mod room;

pub mod prelude {
    pub use crate::protocol::{ClientEvent, ProtocolError, ServerEvent};
    pub use crate::room::{CurrentRoom, RoomInfo};
}

pub use prelude::*;
