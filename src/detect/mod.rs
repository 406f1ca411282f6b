mod backend;
mod backends;
mod labels;
mod registry;
mod result;

pub use backend::Classifier;
pub use backends::{ScriptHandle, ScriptedClassifier, SimulatedClassifier};
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use labels::{WeaponLabels, DEFAULT_WEAPON_LABELS};
pub use registry::ClassifierRegistry;
pub use result::{BoundingBox, Detection};
