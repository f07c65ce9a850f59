pub mod augmentation;
pub mod conversion;
pub mod dataset;
pub mod driver_model;
pub mod evaluation;
pub mod inference;
pub mod training;

pub use conversion::{convert_model, decode_classifier, encode_weights};
pub use dataset::{DriverBatch, DriverBatcher, DriverImageDataset, DriverItem};
pub use driver_model::{DriverClassifier, ModelConfig};
pub use evaluation::{evaluate_directory, evaluate_loader, ClassificationTally};
pub use inference::{InferenceEngine, Prediction};
pub use training::{train_model, train_model_on, TrainingOutcome, TrainingRun};
