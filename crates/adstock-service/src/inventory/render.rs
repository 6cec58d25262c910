use futures::future::BoxFuture;

use super::{PayloadHandle, RenderError, ResourceKind};

/// The display layer that consumes assets.
///
/// Ownership of the payload moves to the renderer. Dropping the handle (or calling
/// [`PayloadHandle::release`]) is the terminal "consumed" signal and frees the vendor resource,
/// regardless of whether rendering succeeded.
///
/// The returned future resolves once the asset was shown and dismissed, or failed to render.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        kind: ResourceKind,
        payload: PayloadHandle,
    ) -> BoxFuture<'static, Result<(), RenderError>>;
}
