//! 生成服务层：抽象与实现（OpenAI 兼容端点含 DeepSeek 预设 / Mock）

pub mod mock;
pub mod openai;
pub mod prompts;
pub mod traits;

pub use mock::MockGenerator;
pub use openai::{OpenAiGenerator, DEEPSEEK_CHAT, OPENAI_DEFAULT_MODEL};
pub use prompts::parse_verdict;
pub use traits::{GenerationError, GenerationKind, GenerationRequest, GenerationService};
