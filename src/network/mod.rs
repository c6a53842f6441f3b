//! UDP side of the stream: the socket is only a byte source for the decoder.

pub mod receiver;

pub use receiver::receiver_task;

/// Port the Tello streams H.264 to after `streamon`.
pub const TELLO_VIDEO_PORT: u16 = 11111;

/// Tello video datagrams are at most 1460 bytes; leave headroom.
pub const MAX_DATAGRAM: usize = 2048;
