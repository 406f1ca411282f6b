pub mod simulated;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use simulated::SimulatedClassifier;
pub use stub::{ScriptHandle, ScriptedClassifier};

#[cfg(feature = "backend-tract")]
pub use tract::TractClassifier;
