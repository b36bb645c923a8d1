//! Decoder for binary 2D skeletal-animation exports of the 2.1 era.
//!
//! This crate is renderer-agnostic: it turns `.skel` bytes into an immutable
//! [`SkeletonData`] description (bones, slots, skins, attachments, events,
//! animations) and leaves texture binding to an [`AttachmentLoader`]
//! implementation supplied by the caller.

#![forbid(unsafe_code)]

mod binary;
mod error;
mod loader;
mod model;

pub use binary::*;
pub use error::*;
pub use loader::*;
pub use model::*;
