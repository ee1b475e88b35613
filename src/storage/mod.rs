pub mod object_store;
pub mod paths;

pub use object_store::{FsObjectStore, ObjectStore};
pub use paths::DocRef;
