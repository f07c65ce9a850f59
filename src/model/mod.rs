pub mod config;
pub mod mobile_spec;
pub mod model_metadata;
pub mod model_storage;

pub use config::{
    AppConfig, AugmentationSettings, ConversionSettings, DeviceType, ModelSettings,
    PartitionSettings, TrainingSettings,
};
pub use mobile_spec::{add_enumerated_image_sizes, DescriptionMetadata, ImageSize, ModelDescription};
pub use model_metadata::{EvaluationScores, ModelMetadata, WeightPrecision};
pub use model_storage::{
    load_metadata, load_model_binary, load_model_with_metadata, print_metadata_info,
    save_model_with_metadata, with_bundle_suffix,
};
