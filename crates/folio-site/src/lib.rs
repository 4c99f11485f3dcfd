//! Site builds for folio.
//!
//! Binds parsed documents to templates and writes the resulting pages, assets
//! and site-wide artifacts into an output directory.

pub mod assets;
pub mod builder;
pub mod emitter;
pub mod renderer;
pub mod templates;

pub use assets::AssetPipeline;
pub use builder::{
    BuildConfig, BuildError, BuildResult, CancelFlag, FailureKind, PageFailure, StaticBuilder,
};
pub use emitter::{EmitError, Emitter};
pub use renderer::{PageSummary, RenderError, RenderOptions, RenderedPage, Renderer, SiteContext};
pub use templates::{TemplateError, TemplateSet, DEFAULT_TEMPLATE, LISTING_TEMPLATE};
