//! Ports layer: Trait definitions for external capabilities.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the pipeline and its collaborators (trained model, explainer,
//! artifact retrieval).

mod artifact;
mod classifier;
mod explainer;

pub use artifact::ArtifactSource;
pub use classifier::{ClassifierError, RiskClassifier};
pub use explainer::Explainer;
