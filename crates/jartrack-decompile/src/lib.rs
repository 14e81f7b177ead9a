pub mod decompiler;
pub mod driver;
pub mod engine;

pub use decompiler::{CfrDecompiler, Decompiler};
pub use driver::{DecompileOutcome, DecompileStatus};
pub use engine::{BatchWork, DecompileEngine, ServiceBatch};
