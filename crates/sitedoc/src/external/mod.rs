//! External processes: the script runner and the scripts built on it

pub mod excel;
pub mod script;
pub mod split_script;

pub use excel::{ExcelModifier, ScriptReport};
pub use script::{ScriptOutput, ScriptRunner};
pub use split_script::{ProgressTranslator, SplitScript};
