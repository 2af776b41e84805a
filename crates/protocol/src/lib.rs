//! backroom-protocol – Wire-Protokoll zwischen Host und Gaesten
//!
//! Dieses Crate definiert alle Frames, die ueber eine Raum-Verbindung
//! laufen, sowie den laengenpraefixierten Codec fuer `tokio_util::codec::Framed`.

pub mod control;
pub mod wire;

pub use control::{Frame, JoinRejection};
pub use wire::{Decoded, FrameCodec};
