//! Rendering: the surface, the scene painter and the frame loop.

pub mod render_loop;
pub mod scene;
pub mod scheduler;
pub mod surface;

pub use render_loop::RenderLoop;
pub use scheduler::FrameScheduler;
pub use surface::Surface;
