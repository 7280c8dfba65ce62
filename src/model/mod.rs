//! Model handles, load requests, loaders and the load coordinator.

pub mod coordinator;
pub mod device;
pub mod handle;
pub mod loader;
pub mod request;

pub use coordinator::{LoadCoordinator, LoadedModels};
pub use device::Device;
pub use handle::{
    AnomalyModel, Classification, ClassifierModel, EncoderModel, LanguageModel, Model,
    ModelHandle, ModelKind, TimeseriesModel,
};
pub use loader::{blocking, loader_fn, FnLoader, Loader, Loaders};
pub use request::{
    AnomalyRequest, ClassifierRequest, EncoderRequest, EncoderTask, Fingerprint,
    LanguageRequest, ModelFormat, ModelRequest, TimeseriesRequest,
};
