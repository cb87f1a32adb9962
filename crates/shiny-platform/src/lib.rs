// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use shiny_render::RenderSize;
use winit::dpi::PhysicalSize;

/// Drawable size in pixels as the renderer expects it.
pub fn drawable_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize {
        width: size.width,
        height: size.height,
    }
}
