pub mod analyzer;
pub mod gemini; // Inline base64 generateContent backend
pub mod scratch;
pub mod workflow; // Files API upload + workflow engine backend

pub use analyzer::{build_analyzer, AnalysisError, ImageAnalyzer};
pub use gemini::GeminiAnalyzer;
pub use workflow::WorkflowAnalyzer;
