pub mod bucket;

pub use bucket::{BucketError, FsObjectStore, ObjectRef, ObjectStore};
