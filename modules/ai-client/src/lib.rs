pub mod error;
pub mod openrouter;
pub mod schema;
pub mod traits;
pub mod util;

pub use error::AiError;
pub use openrouter::OpenRouter;
pub use schema::StructuredOutput;
pub use traits::{CompletionOptions, JsonMode, TextCompletion};
pub use util::{preview, strip_code_blocks};
