//! Model interaction layer: the client seam, the Gemini REST implementation,
//! the session registry, and the two code-generation stages.

pub mod client;
pub mod gemini;
pub mod stage;
pub mod store;

pub use client::ModelClient;
pub use gemini::GeminiClient;
pub use stage::{GenerationStage, render_questions};
pub use store::SessionStore;
