mod batch;
mod dataloader;
mod dataset;
mod descriptor;

pub use batch::Batch;
pub use dataloader::{Batches, DataLoader};
pub use dataset::InMemoryDataset;
pub use descriptor::DatasetDescriptor;
