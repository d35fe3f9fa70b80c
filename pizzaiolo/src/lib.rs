pub mod api;
pub mod embedding;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod reviews;

pub use api::{ApiServer, ApiServerConfig, AuthState, JwtAuth};
pub use embedding::EmbeddingGenerator;
pub use llm::{LlmError, ModelProvider, OllamaProvider, TogetherProvider};
pub use pipeline::{build_pipeline, PipelineAnswer, QaPipeline, ReviewSource};
pub use reviews::{load_corpus, Review, ReviewIndex, ScoredReview};
