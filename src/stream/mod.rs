pub mod frame;

pub use frame::{ChatFrame, FrameDecoder, FrameError};
