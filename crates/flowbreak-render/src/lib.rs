//! Block flow content, page output and a layout facade for `flowbreak`.

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

mod block_flow;
mod render_engine;
mod render_ir;

pub use block_flow::{BlockFlow, FlowBlock, FlowSpace};
pub use render_engine::{
    CancelToken, NeverCancel, PageAreaSink, RenderDiagnostic, RenderEngine, RenderEngineError,
    RenderEngineOptions,
};
pub use render_ir::{BlockCommand, DrawCommand, PageMetrics, RenderPage, SpaceCommand};
