//! Error diagnosis pipeline
//!
//! Turns a raw runtime error plus lightweight repository context into a
//! structured [`AnalysisResult`]. The shape of the result is guaranteed even
//! when the reasoning service is missing, unreachable or talks nonsense.

pub mod client;
pub mod error;
pub mod fallback;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod relevance;
pub mod severity;
pub mod types;

pub use client::{GeminiClient, GenerationSettings, InferenceClient, OpenRouterClient};
pub use error::{InvalidRequest, MalformedResponseError, ServiceError};
pub use fallback::{synthesize, FallbackReason};
pub use parse::normalize;
pub use pipeline::{Analyzer, PipelineSettings, Provider};
pub use prompts::build_prompt;
pub use relevance::{filter_relevant, Language};
pub use severity::classify;
pub use types::{
    AnalysisRequest, AnalysisResult, CandidateFile, Confidence, Difficulty, PreventionAdvice,
    RelatedResource, ResourceKind, Severity, Solution, SolutionRank,
};
