//! GPU side of the compute dispatch pipeline.
//!
//! - `context` brings up a headless `wgpu` device and records the adapter's
//!   capabilities (RGBA32F filtering, texture size limit).
//! - `binding` validates inputs, uploads them and builds the bind group that
//!   attaches each texture to the kernel binding of the same name.
//! - `dispatch` sizes the work-group grid, submits the compute pass and waits
//!   for it to retire before handing out a [`DispatchHandle`].
//! - `readback` copies the output texture into a tightly packed host buffer.

pub(crate) mod binding;
mod context;
mod dispatch;
mod readback;

pub use binding::{BindingTable, BoundState};
pub use context::GpuContext;
pub use dispatch::{DispatchEngine, DispatchGrid, DispatchHandle};
pub use readback::ReadbackBuffer;
