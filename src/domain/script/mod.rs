pub mod error;
pub mod model;
pub mod normalizer;
pub mod parser;
pub mod scripter;

pub use error::ScriptingError;
pub use model::{Block, BlockKind, NormalizedText, RawContent, Script, Speaker, Utterance};
pub use normalizer::normalize;
pub use parser::parse_script;
pub use scripter::{AiScripter, BaselineScripter, DialogueScripter, ScripterOptions};
