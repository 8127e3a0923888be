//! Headless GPU device.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a window
//! - allocating offscreen color targets and encoders for a frame
//! - handing out a [`RenderCtx`](crate::render::RenderCtx) for batch uploads

mod frame;
mod gpu;
mod init;

pub use frame::OffscreenFrame;
pub use gpu::HeadlessGpu;
pub use init::HeadlessInit;
