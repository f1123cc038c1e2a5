mod model_registry;

pub use model_registry::{ModelEntry, ModelRegistry};
